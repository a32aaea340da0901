use super::types::*;
use crate::config::{expand_env_vars, expand_tilde, ENV_VAR_PATTERN};
use regex::Regex;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

pub const INSTANCE_ID_ENV: &str = "WEBSITE_INSTANCE_ID";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    use std::io::Read;

    let mut file = File::open(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to open config file '{}': {}", path.display(), e),
        ))
    })?;

    let mut yaml_string = String::new();
    file.read_to_string(&mut yaml_string).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    parse_config(&yaml_string).map_err(|e| match e {
        ConfigError::YamlParse(e) => ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("in file '{}': {}", path.display(), e),
        )),
        other => other,
    })
}

/// Parse, expand and validate a YAML config document.
pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    // Expand environment variables in the YAML string before parsing
    let yaml_string = expand_env_vars(yaml);
    check_unexpanded_vars(&yaml_string)?;

    let mut config: Config = serde_yaml::from_str(&yaml_string)?;

    expand_paths(&mut config);
    resolve_instance_id(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Checks for unexpanded environment variables and returns a helpful error
fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let re = Regex::new(ENV_VAR_PATTERN).expect("env var pattern is valid");
    let mut unexpanded_vars: Vec<String> = re
        .captures_iter(yaml_string)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .collect();

    if unexpanded_vars.is_empty() {
        return Ok(());
    }

    unexpanded_vars.sort();
    unexpanded_vars.dedup();

    let error_msg = if unexpanded_vars.len() == 1 {
        format!(
            "Environment variable $env{{{0}}} is not set.\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variable: export {0}=...\n\
             2. Replace $env{{{0}}} in the config file with an actual value",
            unexpanded_vars[0]
        )
    } else {
        format!(
            "Environment variables are not set: {}\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variables\n\
             2. Replace the variables in the config file with actual values",
            unexpanded_vars.join(", ")
        )
    };

    Err(ConfigError::Validation(error_msg))
}

/// Expands tilde (~) in all PathBuf fields in the config.
fn expand_paths(config: &mut Config) {
    config.database.path = expand_tilde(&config.database.path);

    if let Some(catalog) = config.catalog.as_mut() {
        catalog.directory = expand_tilde(&catalog.directory);
    }
}

/// Fill in the catalog instance ID from the environment or the hostname.
fn resolve_instance_id(config: &mut Config) {
    let Some(catalog) = config.catalog.as_mut() else {
        return;
    };

    if catalog.instance_id.as_deref().is_some_and(|id| !id.trim().is_empty()) {
        return;
    }

    catalog.instance_id = std::env::var(INSTANCE_ID_ENV)
        .ok()
        .filter(|id| !id.trim().is_empty())
        .or_else(|| {
            hostname::get()
                .ok()
                .and_then(|h| h.to_str().map(|s| s.to_string()))
        });
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if !config.records_downloads() && config.enabled_catalog().is_none() {
        errors.push(
            "no storage target enabled: set 'database.record_downloads' or 'catalog.enabled' to true"
                .to_string(),
        );
    }

    if config.server.listen.parse::<std::net::SocketAddr>().is_err() {
        errors.push(format!(
            "server.listen: invalid socket address '{}'",
            config.server.listen
        ));
    }

    if config.database.path.as_os_str().is_empty() {
        errors.push("database.path cannot be empty".to_string());
    }

    if let Some(catalog) = config.enabled_catalog() {
        validate_catalog(catalog, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}

fn validate_catalog(catalog: &CatalogConfig, errors: &mut Vec<String>) {
    if catalog.directory.as_os_str().is_empty() {
        errors.push("catalog.directory cannot be empty".to_string());
    }

    if catalog.base_address.trim().is_empty() {
        errors.push("catalog.base_address cannot be empty".to_string());
    }

    match catalog.instance_id.as_deref() {
        None => errors.push(format!(
            "catalog.instance_id is not set and neither ${} nor the hostname is available",
            INSTANCE_ID_ENV
        )),
        Some(id) if id.contains(['/', '\\']) || id == "." || id == ".." => {
            errors.push(format!(
                "catalog.instance_id '{}' must be a single path segment",
                id
            ));
        }
        Some(_) => {}
    }

    if catalog.page_size == 0 {
        errors.push("catalog.page_size must be greater than zero".to_string());
    }

    if catalog.batch_size == 0 {
        errors.push("catalog.batch_size must be greater than zero".to_string());
    }

    if catalog.flush_period.is_zero() {
        errors.push("catalog.flush_period must be greater than zero".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const DB_ONLY: &str = r#"
database:
  path: /var/lib/pkgstats/gallery.duckdb
  record_downloads: true
"#;

    #[test]
    fn test_database_only_config() {
        let config = parse_config(DB_ONLY).unwrap();
        assert!(config.records_downloads());
        assert!(config.enabled_catalog().is_none());
        assert_eq!(config.server.listen, "127.0.0.1:12345");
        assert_eq!(config.database.command_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_nothing_enabled_is_rejected() {
        let yaml = r#"
database:
  path: /var/lib/pkgstats/gallery.duckdb
"#;
        let err = parse_config(yaml).unwrap_err();
        assert!(err.to_string().contains("no storage target enabled"));
    }

    #[test]
    fn test_catalog_defaults() {
        let yaml = r#"
database:
  path: /var/lib/pkgstats/gallery.duckdb
catalog:
  enabled: true
  directory: /var/lib/pkgstats/catalog
  base_address: http://localhost:8000/catalog
  instance_id: A1B2C3D4
"#;
        let config = parse_config(yaml).unwrap();
        let catalog = config.enabled_catalog().unwrap();
        assert_eq!(catalog.page_size, 500);
        assert_eq!(catalog.batch_size, 1000);
        assert_eq!(catalog.flush_period, Duration::from_secs(60));
        assert_eq!(catalog.instance_id.as_deref(), Some("A1B2C3D4"));
    }

    #[test]
    fn test_catalog_humantime_durations() {
        let yaml = r#"
database:
  path: /tmp/gallery.duckdb
  command_timeout: 250ms
catalog:
  enabled: true
  directory: /tmp/catalog
  base_address: http://localhost/catalog
  instance_id: test
  flush_period: 2m
  batch_size: 5
"#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.database.command_timeout, Duration::from_millis(250));
        let catalog = config.enabled_catalog().unwrap();
        assert_eq!(catalog.flush_period, Duration::from_secs(120));
        assert_eq!(catalog.batch_size, 5);
    }

    #[test]
    fn test_catalog_validation_collects_all_errors() {
        let yaml = r#"
database:
  path: /tmp/gallery.duckdb
catalog:
  enabled: true
  directory: /tmp/catalog
  base_address: ""
  instance_id: "a/b"
  page_size: 0
  batch_size: 0
"#;
        match parse_config(yaml) {
            Err(ConfigError::ValidationList(errors)) => {
                assert_eq!(errors.len(), 4, "{:?}", errors);
                assert!(errors.iter().any(|e| e.contains("base_address")));
                assert!(errors.iter().any(|e| e.contains("instance_id")));
                assert!(errors.iter().any(|e| e.contains("page_size")));
                assert!(errors.iter().any(|e| e.contains("batch_size")));
            }
            other => panic!("expected validation errors, got {:?}", other),
        }
    }

    #[test]
    fn test_disabled_catalog_is_not_validated() {
        let yaml = r#"
database:
  path: /tmp/gallery.duckdb
  record_downloads: true
catalog:
  enabled: false
  directory: /tmp/catalog
  base_address: ""
  batch_size: 0
"#;
        let config = parse_config(yaml).unwrap();
        assert!(config.enabled_catalog().is_none());
    }

    #[test]
    fn test_invalid_listen_address() {
        let yaml = r#"
server:
  listen: not-an-address
database:
  path: /tmp/gallery.duckdb
  record_downloads: true
"#;
        let err = parse_config(yaml).unwrap_err();
        assert!(err.to_string().contains("server.listen"));
    }

    #[test]
    fn test_unexpanded_env_var_is_reported() {
        let yaml = r#"
database:
  path: $env{PKGSTATS_SURELY_UNSET_VAR}/gallery.duckdb
  record_downloads: true
"#;
        let err = parse_config(yaml).unwrap_err();
        assert!(err.to_string().contains("PKGSTATS_SURELY_UNSET_VAR"));
    }
}

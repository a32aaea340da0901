use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub catalog: Option<CatalogConfig>,
}

impl Config {
    /// Catalog settings, only when the catalog target is switched on.
    pub fn enabled_catalog(&self) -> Option<&CatalogConfig> {
        self.catalog.as_ref().filter(|c| c.enabled)
    }

    pub fn records_downloads(&self) -> bool {
        self.database.record_downloads
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:12345".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Gallery database holding package registrations and download rows
    pub path: PathBuf,
    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub command_timeout: Duration,
    /// Insert one row per download event
    #[serde(default)]
    pub record_downloads: bool,
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(5)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub enabled: bool,
    pub directory: PathBuf,
    pub base_address: String,
    /// Falls back to $WEBSITE_INSTANCE_ID, then the hostname
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_flush_period", with = "humantime_serde")]
    pub flush_period: Duration,
}

fn default_page_size() -> usize {
    500
}

fn default_batch_size() -> usize {
    1000
}

fn default_flush_period() -> Duration {
    Duration::from_secs(60)
}

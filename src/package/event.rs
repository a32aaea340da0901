use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("download event is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("invalid download event: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// A single package download as posted by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadEvent {
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub dependent_package: Option<String>,
    #[serde(default)]
    pub project_guids: Option<String>,
}

impl DownloadEvent {
    /// Build an event from a posted JSON object.
    ///
    /// `id` and `version` must be present and non-empty. Optional values that
    /// are not strings are kept in their JSON text form.
    pub fn from_json(value: &Value) -> Result<Self, EventError> {
        let id = required(value, "id")?;
        let version = required(value, "version")?;

        Ok(Self {
            id,
            version,
            ip_address: optional(value, "ipAddress"),
            user_agent: optional(value, "userAgent"),
            operation: optional(value, "operation"),
            dependent_package: optional(value, "dependentPackage"),
            project_guids: optional(value, "projectGuids"),
        })
    }

    pub fn user_agent_or_empty(&self) -> &str {
        self.user_agent.as_deref().unwrap_or_default()
    }

    pub fn operation_or_empty(&self) -> &str {
        self.operation.as_deref().unwrap_or_default()
    }

    pub fn dependent_package_or_empty(&self) -> &str {
        self.dependent_package.as_deref().unwrap_or_default()
    }

    pub fn project_guids_or_empty(&self) -> &str {
        self.project_guids.as_deref().unwrap_or_default()
    }
}

fn required(value: &Value, key: &'static str) -> Result<String, EventError> {
    optional(value, key).ok_or(EventError::MissingField(key))
}

fn optional(value: &Value, key: &str) -> Option<String> {
    let text = match value.get(key)? {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

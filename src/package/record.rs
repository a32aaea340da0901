use crate::package::event::DownloadEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Existence metadata for a package version, resolved from the gallery database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub title: String,
    pub description: String,
    pub icon_url: String,
    pub listed: bool,
}

/// One download, stamped at ingestion and ready to be batched into the catalog.
///
/// Records are immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsRecord {
    pub download_timestamp: DateTime<Utc>,
    pub package_id: String,
    pub package_version: String,
    pub download_user_agent: String,
    pub download_operation: String,
    pub download_dependent_package_id: String,
    pub download_project_types: String,
    pub package_title: String,
    pub package_description: String,
    pub package_icon_url: String,
    pub package_listed: bool,
}

impl StatsRecord {
    pub fn new(timestamp: DateTime<Utc>, event: &DownloadEvent, package: PackageInfo) -> Self {
        Self {
            download_timestamp: timestamp,
            package_id: event.id.clone(),
            package_version: event.version.clone(),
            download_user_agent: event.user_agent_or_empty().to_string(),
            download_operation: event.operation_or_empty().to_string(),
            download_dependent_package_id: event.dependent_package_or_empty().to_string(),
            download_project_types: event.project_guids_or_empty().to_string(),
            package_title: package.title,
            package_description: package.description,
            package_icon_url: package.icon_url,
            package_listed: package.listed,
        }
    }
}

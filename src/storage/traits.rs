use crate::catalog::CatalogError;
use crate::package::{DownloadEvent, PackageInfo};
use async_trait::async_trait;

/// A destination for download statistics.
#[async_trait]
pub trait MetricsStorage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn add_download_statistics(&self, event: &DownloadEvent) -> Result<(), StorageError>;
}

/// Read/write access to the gallery's package tables.
#[async_trait]
pub trait PackageStore: Send + Sync {
    /// Existence metadata for a package version, if it is registered.
    async fn lookup(
        &self,
        id: &str,
        normalized_version: &str,
    ) -> Result<Option<PackageInfo>, StorageError>;

    /// Insert one download row for a registered package version.
    async fn insert_statistics(
        &self,
        normalized_version: &str,
        event: &DownloadEvent,
    ) -> Result<(), StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] ::duckdb::Error),

    #[error("query timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("package '{id}' version '{version}' does not exist")]
    PackageNotFound { id: String, version: String },

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

use super::traits::{MetricsStorage, PackageStore, StorageError};
use crate::package::{normalize_version, DownloadEvent};
use async_trait::async_trait;
use std::sync::Arc;

/// Records one `package_statistics` row per download.
pub struct DatabaseMetricsStorage {
    store: Arc<dyn PackageStore>,
}

impl DatabaseMetricsStorage {
    pub fn new(store: Arc<dyn PackageStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MetricsStorage for DatabaseMetricsStorage {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn add_download_statistics(&self, event: &DownloadEvent) -> Result<(), StorageError> {
        let version = normalize_version(&event.version);
        self.store.insert_statistics(&version, event).await?;
        tracing::trace!(id = %event.id, version = %version, "Recorded download row");
        Ok(())
    }
}

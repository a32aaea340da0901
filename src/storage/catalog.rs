use super::traits::{MetricsStorage, PackageStore, StorageError};
use crate::catalog::CatalogPipeline;
use crate::package::{normalize_version, Clock, DownloadEvent, StatsRecord, SystemClock};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{trace, warn};

/// Turns downloads of registered packages into catalog records.
///
/// Unknown package versions are logged and skipped rather than reported as
/// errors; the catalog only describes packages the gallery knows about.
pub struct CatalogMetricsStorage {
    store: Arc<dyn PackageStore>,
    pipeline: CatalogPipeline,
    clock: Arc<dyn Clock>,
}

impl CatalogMetricsStorage {
    pub fn new(store: Arc<dyn PackageStore>, pipeline: CatalogPipeline) -> Self {
        Self::with_clock(store, pipeline, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn PackageStore>,
        pipeline: CatalogPipeline,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            pipeline,
            clock,
        }
    }

    pub fn pipeline(&self) -> &CatalogPipeline {
        &self.pipeline
    }
}

#[async_trait]
impl MetricsStorage for CatalogMetricsStorage {
    fn name(&self) -> &'static str {
        "catalog"
    }

    async fn add_download_statistics(&self, event: &DownloadEvent) -> Result<(), StorageError> {
        let version = normalize_version(&event.version);

        let Some(package) = self.store.lookup(&event.id, &version).await? else {
            warn!(
                id = %event.id,
                version = %version,
                "Package not found in gallery, download not added to catalog"
            );
            return Ok(());
        };

        let record = StatsRecord::new(self.clock.now(), event, package);
        self.pipeline.append(record)?;
        trace!(id = %event.id, version = %version, "Buffered catalog record");
        Ok(())
    }
}

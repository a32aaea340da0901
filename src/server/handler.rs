use crate::package::DownloadEvent;
use crate::storage::MetricsStorage;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("request body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Fans download events out to every configured storage target.
pub struct StatsHandler {
    storages: Vec<Arc<dyn MetricsStorage>>,
    processed: AtomicU64,
}

impl StatsHandler {
    pub fn new(storages: Vec<Arc<dyn MetricsStorage>>) -> Self {
        Self {
            storages,
            processed: AtomicU64::new(0),
        }
    }

    /// Events processed since start, across all requests.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Parse a request body into events.
    ///
    /// An object is one event and an array is a list of them. Any other JSON
    /// value yields no events. Array elements that are not objects, and
    /// events without `id` or `version`, are skipped with a warning.
    pub fn parse(&self, body: &[u8]) -> Result<Vec<DownloadEvent>, HandlerError> {
        let value: Value = serde_json::from_slice(body)?;

        let objects = match value {
            Value::Object(_) => vec![value],
            Value::Array(items) => items,
            other => {
                warn!(body = %other, "Ignoring request body that is not a JSON object or array");
                Vec::new()
            }
        };

        let events = objects
            .iter()
            .filter_map(|object| {
                if !object.is_object() {
                    warn!("Skipping array element that is not a JSON object");
                    return None;
                }
                match DownloadEvent::from_json(object) {
                    Ok(event) => Some(event),
                    Err(e) => {
                        warn!(error = %e, "Skipping download event");
                        None
                    }
                }
            })
            .collect();

        Ok(events)
    }

    /// Record each event in every storage. Failures are logged per storage
    /// and never stop the remaining work.
    pub async fn process(&self, events: Vec<DownloadEvent>) {
        for event in &events {
            for storage in &self.storages {
                if let Err(e) = storage.add_download_statistics(event).await {
                    error!(
                        storage = storage.name(),
                        id = %event.id,
                        version = %event.version,
                        error = %e,
                        "Failed to record download"
                    );
                }
            }

            let processed = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(processed, id = %event.id, version = %event.version, "Processed download event");
            if processed % 10_000 == 0 {
                info!(processed, "Download events processed");
            }
        }
    }
}

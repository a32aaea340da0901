use crate::catalog::batch::CatalogItem;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("catalog rejected item: {0}")]
    Rejected(String),
}

/// Append-only destination for catalog items.
///
/// The pipeline calls `add` for one item and then awaits `commit` before
/// moving on, and never calls into the sink from two passes at once.
#[async_trait]
pub trait CatalogSink: Send + Sync {
    /// Stage an item for the next commit.
    fn add(&self, item: CatalogItem) -> Result<(), SinkError>;

    /// Durably append everything staged since the last commit.
    async fn commit(&self) -> Result<(), SinkError>;
}

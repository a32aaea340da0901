use crate::package::StatsRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A sealed group of records, in arrival order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    /// Sealing order; the ring hands batches out in ascending order
    pub sequence_num: u64,
    pub records: Vec<StatsRecord>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A batch prepared for the catalog sink, with its download time range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub item_id: Uuid,
    pub sequence_num: u64,
    /// Timestamp of the first record in arrival order
    pub min_download_timestamp: DateTime<Utc>,
    /// Timestamp of the last record in arrival order
    pub max_download_timestamp: DateTime<Utc>,
    pub records: Vec<StatsRecord>,
}

impl CatalogItem {
    /// Returns None for an empty batch, which has nothing to commit.
    pub fn from_batch(batch: Batch) -> Option<Self> {
        let min_download_timestamp = batch.records.first()?.download_timestamp;
        let max_download_timestamp = batch.records.last()?.download_timestamp;

        Some(Self {
            item_id: Uuid::new_v4(),
            sequence_num: batch.sequence_num,
            min_download_timestamp,
            max_download_timestamp,
            records: batch.records,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

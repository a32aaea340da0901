#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use pkgstats::catalog::{CatalogItem, CatalogSink, SinkError};
use pkgstats::package::StatsRecord;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Sink double that records committed items and detects overlapping calls.
#[derive(Default)]
pub struct RecordingSink {
    staged: Mutex<Vec<CatalogItem>>,
    committed: Mutex<Vec<CatalogItem>>,
    in_flight: AtomicBool,
    pub overlaps: AtomicUsize,
    pub commit_delay: Duration,
    /// Items whose first record has this package id fail to commit
    pub fail_package: Option<String>,
}

impl RecordingSink {
    pub fn slow(commit_delay: Duration) -> Self {
        Self {
            commit_delay,
            ..Default::default()
        }
    }

    pub fn failing_on(package_id: &str) -> Self {
        Self {
            fail_package: Some(package_id.to_string()),
            ..Default::default()
        }
    }

    pub fn committed(&self) -> Vec<CatalogItem> {
        self.committed.lock().unwrap().clone()
    }

    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogSink for RecordingSink {
    fn add(&self, item: CatalogItem) -> Result<(), SinkError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        self.staged.lock().unwrap().push(item);
        Ok(())
    }

    async fn commit(&self) -> Result<(), SinkError> {
        if !self.commit_delay.is_zero() {
            tokio::time::sleep(self.commit_delay).await;
        }

        let staged: Vec<CatalogItem> = self.staged.lock().unwrap().drain(..).collect();
        let fail = staged.iter().any(|item| {
            self.fail_package.as_deref() == item.records.first().map(|r| r.package_id.as_str())
        });

        let result = if fail {
            Err(SinkError::Rejected("simulated commit failure".to_string()))
        } else {
            self.committed.lock().unwrap().extend(staged);
            Ok(())
        };

        self.in_flight.store(false, Ordering::SeqCst);
        result
    }
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
}

/// A record whose timestamp encodes `n` seconds after `base_time`.
pub fn record(package_id: &str, n: i64) -> StatsRecord {
    StatsRecord {
        download_timestamp: base_time() + ChronoDuration::seconds(n),
        package_id: package_id.to_string(),
        package_version: "1.0.0".to_string(),
        download_user_agent: "NuGet Command Line/6.0".to_string(),
        download_operation: "Install".to_string(),
        download_dependent_package_id: String::new(),
        download_project_types: String::new(),
        package_title: package_id.to_string(),
        package_description: String::new(),
        package_icon_url: String::new(),
        package_listed: true,
    }
}

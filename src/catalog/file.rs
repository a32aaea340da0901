use crate::catalog::batch::CatalogItem;
use crate::catalog::sink::{CatalogSink, SinkError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};
use uuid::Uuid;

const INDEXES_DIR: &str = "indexes";
const DATA_DIR: &str = "data";
const INDEX_FILE: &str = "index.json";

/// Append-only catalog kept in a local directory.
///
/// Layout under the catalog root:
///
/// ```text
/// indexes/<instance_id>.json      pointer to this instance's catalog
/// <instance_id>/index.json        page list
/// <instance_id>/page<N>.json      item entries, at most `page_size` per page
/// <instance_id>/data/<item>.json  one immutable document per catalog item
/// ```
///
/// Every instance writes its own catalog so several processes can share a root.
pub struct FileCatalog {
    catalog_dir: PathBuf,
    base_address: String,
    page_size: usize,
    staged: Mutex<Vec<CatalogItem>>,
    index: tokio::sync::Mutex<CatalogIndex>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogIndex {
    pub base_address: String,
    pub count: u64,
    pub last_updated: Option<DateTime<Utc>>,
    pub pages: Vec<PageSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSummary {
    pub address: String,
    pub count: usize,
    pub min_download_timestamp: DateTime<Utc>,
    pub max_download_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageEntry {
    pub address: String,
    pub item_id: Uuid,
    pub sequence_num: u64,
    pub record_count: usize,
    pub min_download_timestamp: DateTime<Utc>,
    pub max_download_timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InstancePointer<'a> {
    catalog_index_path: &'a str,
    catalog_last_updated: DateTime<Utc>,
}

impl FileCatalog {
    /// Open (or create) the catalog for `instance_id` under `root` and publish
    /// the instance pointer in `root/indexes`.
    pub async fn open(
        root: &Path,
        instance_id: &str,
        base_address: &str,
        page_size: usize,
    ) -> Result<Self, SinkError> {
        let catalog_dir = root.join(instance_id);
        tokio::fs::create_dir_all(catalog_dir.join(DATA_DIR)).await?;
        tokio::fs::create_dir_all(root.join(INDEXES_DIR)).await?;

        let pointer = InstancePointer {
            catalog_index_path: instance_id,
            catalog_last_updated: Utc::now(),
        };
        let pointer_path = root.join(INDEXES_DIR).join(format!("{}.json", instance_id));
        write_json(&pointer_path, &pointer).await?;

        let base_address = format!("{}/{}", base_address.trim_end_matches('/'), instance_id);

        let index_path = catalog_dir.join(INDEX_FILE);
        let index = match tokio::fs::read(&index_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CatalogIndex {
                base_address: base_address.clone(),
                ..Default::default()
            },
            Err(e) => return Err(e.into()),
        };

        info!(
            path = %catalog_dir.display(),
            items = index.count,
            pages = index.pages.len(),
            "Opened file catalog"
        );

        Ok(Self {
            catalog_dir,
            base_address,
            page_size: page_size.max(1),
            staged: Mutex::new(Vec::new()),
            index: tokio::sync::Mutex::new(index),
        })
    }

    pub fn catalog_dir(&self) -> &Path {
        &self.catalog_dir
    }

    /// Current page list, as last committed.
    pub async fn index(&self) -> CatalogIndex {
        self.index.lock().await.clone()
    }

    /// Entries of one page, as far as the committed index covers them.
    pub async fn read_page(&self, page_num: usize) -> Result<Vec<PageEntry>, SinkError> {
        let published = self.index.lock().await.pages.get(page_num).map(|p| p.count);
        let mut entries = self.read_page_file(page_num).await?;
        entries.truncate(published.unwrap_or(0));
        Ok(entries)
    }

    async fn read_page_file(&self, page_num: usize) -> Result<Vec<PageEntry>, SinkError> {
        let bytes = tokio::fs::read(self.catalog_dir.join(page_file_name(page_num))).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// A committed item document, read back from disk.
    pub async fn read_item(&self, item_id: Uuid) -> Result<CatalogItem, SinkError> {
        let path = self.catalog_dir.join(DATA_DIR).join(format!("{}.json", item_id));
        let bytes = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn append_to_pages(
        &self,
        index: &mut CatalogIndex,
        items: Vec<CatalogItem>,
    ) -> Result<(), SinkError> {
        let mut page_num = index.pages.len().saturating_sub(1);
        let mut entries = match index.pages.last() {
            Some(page) if page.count < self.page_size => {
                // Entries past the published count belong to a failed commit
                let mut entries = self.read_page_file(page_num).await?;
                entries.truncate(page.count);
                entries
            }
            Some(_) => {
                page_num += 1;
                Vec::new()
            }
            None => Vec::new(),
        };

        for item in items {
            if entries.len() >= self.page_size {
                self.write_page(index, page_num, &entries).await?;
                page_num += 1;
                entries.clear();
            }

            let item_address = format!("{}/{}/{}.json", self.base_address, DATA_DIR, item.item_id);
            let item_path = self
                .catalog_dir
                .join(DATA_DIR)
                .join(format!("{}.json", item.item_id));
            write_json(&item_path, &item).await?;

            entries.push(PageEntry {
                address: item_address,
                item_id: item.item_id,
                sequence_num: item.sequence_num,
                record_count: item.len(),
                min_download_timestamp: item.min_download_timestamp,
                max_download_timestamp: item.max_download_timestamp,
            });
            index.count += 1;
        }

        self.write_page(index, page_num, &entries).await
    }

    async fn write_page(
        &self,
        index: &mut CatalogIndex,
        page_num: usize,
        entries: &[PageEntry],
    ) -> Result<(), SinkError> {
        let Some(first) = entries.first() else {
            return Ok(());
        };

        write_json(&self.catalog_dir.join(page_file_name(page_num)), entries).await?;

        let min_download_timestamp = entries
            .iter()
            .map(|e| e.min_download_timestamp)
            .min()
            .unwrap_or(first.min_download_timestamp);
        let max_download_timestamp = entries
            .iter()
            .map(|e| e.max_download_timestamp)
            .max()
            .unwrap_or(first.max_download_timestamp);

        let summary = PageSummary {
            address: format!("{}/{}", self.base_address, page_file_name(page_num)),
            count: entries.len(),
            min_download_timestamp,
            max_download_timestamp,
        };

        if page_num < index.pages.len() {
            index.pages[page_num] = summary;
        } else {
            index.pages.push(summary);
        }

        Ok(())
    }
}

#[async_trait]
impl CatalogSink for FileCatalog {
    fn add(&self, item: CatalogItem) -> Result<(), SinkError> {
        self.staged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(item);
        Ok(())
    }

    async fn commit(&self) -> Result<(), SinkError> {
        let items = std::mem::take(&mut *self.staged.lock().unwrap_or_else(PoisonError::into_inner));
        if items.is_empty() {
            return Ok(());
        }

        let mut index = self.index.lock().await;
        // Work on a copy so a failed commit leaves the published index untouched
        let mut updated = index.clone();
        let item_count = items.len();

        self.append_to_pages(&mut updated, items).await?;
        updated.last_updated = Some(Utc::now());
        write_json(&self.catalog_dir.join(INDEX_FILE), &updated).await?;

        *index = updated;
        debug!(items = item_count, total = index.count, "Committed to file catalog");
        Ok(())
    }
}

fn page_file_name(page_num: usize) -> String {
    format!("page{}.json", page_num)
}

/// Write through a temporary file and rename, so readers never see a torn document.
async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), SinkError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, bytes).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::batch::Batch;
    use crate::package::{DownloadEvent, PackageInfo, StatsRecord};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn make_item(sequence_num: u64, records: usize) -> CatalogItem {
        let base = Utc.with_ymd_and_hms(2026, 1, 28, 10, 0, 0).unwrap();
        let event = DownloadEvent {
            id: "EntityFramework".to_string(),
            version: "5.0.0".to_string(),
            ip_address: None,
            user_agent: None,
            operation: None,
            dependent_package: None,
            project_guids: None,
        };
        let records = (0..records)
            .map(|i| {
                StatsRecord::new(
                    base + chrono::Duration::seconds(sequence_num as i64 * 100 + i as i64),
                    &event,
                    PackageInfo::default(),
                )
            })
            .collect();
        CatalogItem::from_batch(Batch {
            sequence_num,
            records,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_open_writes_instance_pointer() {
        let dir = TempDir::new().unwrap();
        FileCatalog::open(dir.path(), "A1B2C3D4", "http://localhost:8000/catalog", 500)
            .await
            .unwrap();

        let pointer = std::fs::read_to_string(dir.path().join("indexes/A1B2C3D4.json")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&pointer).unwrap();
        assert_eq!(json["catalogIndexPath"], "A1B2C3D4");
        assert!(json["catalogLastUpdated"].is_string());
    }

    #[tokio::test]
    async fn test_commit_without_staged_items_is_noop() {
        let dir = TempDir::new().unwrap();
        let catalog = FileCatalog::open(dir.path(), "inst", "http://localhost", 2)
            .await
            .unwrap();

        catalog.commit().await.unwrap();
        assert!(!catalog.catalog_dir().join(INDEX_FILE).exists());
        assert_eq!(catalog.index().await.count, 0);
    }

    #[tokio::test]
    async fn test_commit_writes_item_and_index() {
        let dir = TempDir::new().unwrap();
        let catalog = FileCatalog::open(dir.path(), "inst", "http://localhost:8000/catalog/", 10)
            .await
            .unwrap();

        let item = make_item(0, 3);
        let item_id = item.item_id;
        catalog.add(item).unwrap();
        catalog.commit().await.unwrap();

        let index = catalog.index().await;
        assert_eq!(index.count, 1);
        assert_eq!(index.pages.len(), 1);
        assert_eq!(index.pages[0].count, 1);
        assert_eq!(
            index.pages[0].address,
            "http://localhost:8000/catalog/inst/page0.json"
        );

        let page = catalog.read_page(0).await.unwrap();
        assert_eq!(page[0].item_id, item_id);
        assert_eq!(page[0].record_count, 3);

        let stored = catalog.read_item(item_id).await.unwrap();
        assert_eq!(stored.records.len(), 3);
    }

    #[tokio::test]
    async fn test_pages_roll_over_at_page_size() {
        let dir = TempDir::new().unwrap();
        let catalog = FileCatalog::open(dir.path(), "inst", "http://localhost", 2)
            .await
            .unwrap();

        for seq in 0..5 {
            catalog.add(make_item(seq, 1)).unwrap();
            catalog.commit().await.unwrap();
        }

        let index = catalog.index().await;
        assert_eq!(index.count, 5);
        let counts: Vec<usize> = index.pages.iter().map(|p| p.count).collect();
        assert_eq!(counts, vec![2, 2, 1]);

        let last_page = catalog.read_page(2).await.unwrap();
        assert_eq!(last_page[0].sequence_num, 4);
    }

    #[tokio::test]
    async fn test_failed_commit_is_not_picked_up_later() {
        let dir = TempDir::new().unwrap();
        let catalog = FileCatalog::open(dir.path(), "inst", "http://localhost", 10)
            .await
            .unwrap();

        catalog.add(make_item(0, 1)).unwrap();
        catalog.commit().await.unwrap();

        // A non-empty directory in place of index.json makes the index write fail
        let index_path = catalog.catalog_dir().join(INDEX_FILE);
        std::fs::remove_file(&index_path).unwrap();
        std::fs::create_dir_all(index_path.join("blocker")).unwrap();

        catalog.add(make_item(1, 1)).unwrap();
        assert!(catalog.commit().await.is_err());
        assert_eq!(catalog.read_page(0).await.unwrap().len(), 1);

        std::fs::remove_dir_all(&index_path).unwrap();
        catalog.add(make_item(2, 1)).unwrap();
        catalog.commit().await.unwrap();

        let index = catalog.index().await;
        assert_eq!(index.count, 2);
        assert_eq!(index.pages[0].count, 2);

        let sequences: Vec<u64> = catalog
            .read_page(0)
            .await
            .unwrap()
            .iter()
            .map(|e| e.sequence_num)
            .collect();
        assert_eq!(sequences, vec![0, 2]);

        let on_disk: Vec<PageEntry> =
            serde_json::from_slice(&std::fs::read(catalog.catalog_dir().join("page0.json")).unwrap())
                .unwrap();
        assert_eq!(on_disk.len(), 2);
    }

    #[tokio::test]
    async fn test_reopen_continues_existing_catalog() {
        let dir = TempDir::new().unwrap();
        {
            let catalog = FileCatalog::open(dir.path(), "inst", "http://localhost", 3)
                .await
                .unwrap();
            catalog.add(make_item(0, 1)).unwrap();
            catalog.commit().await.unwrap();
        }

        let catalog = FileCatalog::open(dir.path(), "inst", "http://localhost", 3)
            .await
            .unwrap();
        catalog.add(make_item(1, 1)).unwrap();
        catalog.commit().await.unwrap();

        let index = catalog.index().await;
        assert_eq!(index.count, 2);
        assert_eq!(index.pages.len(), 1);
        assert_eq!(catalog.read_page(0).await.unwrap().len(), 2);
    }
}

pub mod catalog;
pub mod database;
pub mod duckdb;
pub mod traits;

pub use catalog::CatalogMetricsStorage;
pub use database::DatabaseMetricsStorage;
pub use self::duckdb::DuckDbPackageStore;
pub use traits::{MetricsStorage, PackageStore, StorageError};

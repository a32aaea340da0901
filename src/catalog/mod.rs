pub mod batch;
pub mod buffer;
pub mod file;
pub mod gate;
pub mod pipeline;
pub mod sink;

pub use batch::{Batch, CatalogItem};
pub use buffer::{AppendOutcome, BatchBuffer};
pub use file::FileCatalog;
pub use gate::{CommitGate, GateGuard};
pub use pipeline::{CatalogError, CatalogPipeline, DrainReport, PipelineConfig, PipelineStats};
pub use sink::{CatalogSink, SinkError};

use crate::catalog::batch::{Batch, CatalogItem};
use crate::catalog::buffer::{AppendOutcome, BatchBuffer};
use crate::catalog::gate::CommitGate;
use crate::catalog::sink::{CatalogSink, SinkError};
use crate::config::types::CatalogConfig;
use crate::package::StatsRecord;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog pipeline is shutting down")]
    ShuttingDown,

    #[error("catalog pipeline must be created inside a tokio runtime: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Records per catalog item
    pub batch_size: usize,
    /// Idle time after which a partially filled batch is flushed
    pub flush_period: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            flush_period: Duration::from_secs(60),
        }
    }
}

impl From<&CatalogConfig> for PipelineConfig {
    fn from(config: &CatalogConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            flush_period: config.flush_period,
        }
    }
}

/// What a single call to [`CatalogPipeline::drain`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// False when another pass held the commit gate
    pub admitted: bool,
    pub committed: usize,
    pub failed: usize,
    pub skipped_empty: usize,
    pub records_committed: usize,
}

impl DrainReport {
    fn absorb(&mut self, other: DrainReport) {
        self.admitted |= other.admitted;
        self.committed += other.committed;
        self.failed += other.failed;
        self.skipped_empty += other.skipped_empty;
        self.records_committed += other.records_committed;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub records_appended: u64,
    pub batches_sealed: u64,
    pub items_committed: u64,
    pub items_failed: u64,
    pub empty_batches_skipped: u64,
    pub open_records: usize,
    pub sealed_batches: usize,
}

#[derive(Default)]
struct Counters {
    records_appended: AtomicU64,
    batches_sealed: AtomicU64,
    items_committed: AtomicU64,
    items_failed: AtomicU64,
    empty_batches_skipped: AtomicU64,
}

/// Batches stats records and commits them to a catalog sink.
///
/// Producers call [`append`](Self::append) from any thread. Full batches and
/// idle flushes are committed by background passes; at most one pass talks to
/// the sink at any time and batches reach it in sealing order. Commit failures
/// drop the affected batch and are only logged.
///
/// Handles are cheap to clone and share one pipeline.
#[derive(Clone)]
pub struct CatalogPipeline {
    inner: Arc<Inner>,
}

struct Inner {
    config: PipelineConfig,
    buffer: BatchBuffer,
    gate: CommitGate,
    sink: Arc<dyn CatalogSink>,
    runtime: Handle,
    tasks: TaskTracker,
    cancel: CancellationToken,
    counters: Counters,
    #[cfg(test)]
    ring_empty_hook: std::sync::Mutex<Option<RingEmptyHook>>,
}

/// Runs once inside a pass, after the ring was seen empty and before the gate
/// reopens.
#[cfg(test)]
type RingEmptyHook = Box<dyn FnOnce(&Inner) + Send>;

impl CatalogPipeline {
    /// Create a pipeline without the idle flush task.
    ///
    /// Must be called from within a tokio runtime; background passes are
    /// spawned onto that runtime even when `append` is called from elsewhere.
    pub fn new(config: PipelineConfig, sink: Arc<dyn CatalogSink>) -> Result<Self, CatalogError> {
        let runtime = Handle::try_current()?;

        Ok(Self {
            inner: Arc::new(Inner {
                buffer: BatchBuffer::new(config.batch_size),
                config,
                gate: CommitGate::new(),
                sink,
                runtime,
                tasks: TaskTracker::new(),
                cancel: CancellationToken::new(),
                counters: Counters::default(),
                #[cfg(test)]
                ring_empty_hook: std::sync::Mutex::new(None),
            }),
        })
    }

    /// Create a pipeline and start its idle flush task.
    pub fn start(config: PipelineConfig, sink: Arc<dyn CatalogSink>) -> Result<Self, CatalogError> {
        let pipeline = Self::new(config, sink)?;
        pipeline.spawn_idle_flush();

        info!(
            batch_size = pipeline.inner.config.batch_size,
            flush_period_ms = pipeline.inner.config.flush_period.as_millis() as u64,
            "Catalog pipeline started"
        );

        Ok(pipeline)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    /// Add a record to the open batch. Never blocks on I/O.
    pub fn append(&self, record: StatsRecord) -> Result<(), CatalogError> {
        match self.inner.buffer.append(record) {
            AppendOutcome::Closed => Err(CatalogError::ShuttingDown),
            AppendOutcome::Buffered => {
                self.inner.counters.records_appended.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            AppendOutcome::Sealed(sequence_num) => {
                self.inner.counters.records_appended.fetch_add(1, Ordering::Relaxed);
                self.inner.counters.batches_sealed.fetch_add(1, Ordering::Relaxed);
                debug!(sequence_num, "Batch full, scheduling catalog commit");
                self.inner.trigger_drain();
                Ok(())
            }
        }
    }

    /// Schedule a background commit pass. Returns immediately.
    pub fn trigger_drain(&self) {
        self.inner.trigger_drain();
    }

    /// Run a commit pass on the current task.
    ///
    /// If another pass holds the gate this returns at once with
    /// `admitted == false`; the active pass picks up everything in the ring.
    pub async fn drain(&self) -> DrainReport {
        self.inner.drain().await
    }

    /// Seal the open batch into the ring, even if it is empty.
    pub fn flush_open(&self) -> u64 {
        self.inner.flush_open()
    }

    /// Stop the idle task, refuse new records, commit everything buffered and
    /// wait for outstanding passes to finish.
    pub async fn shutdown(&self) -> DrainReport {
        let Some(sequence_num) = self.inner.buffer.close() else {
            debug!("Catalog pipeline already shut down");
            return DrainReport::default();
        };
        info!("Shutting down catalog pipeline");
        self.inner.cancel.cancel();

        self.inner.counters.batches_sealed.fetch_add(1, Ordering::Relaxed);
        debug!(sequence_num, "Sealed open batch for shutdown");

        let mut report = self.inner.drain().await;

        self.inner.tasks.close();
        self.inner.tasks.wait().await;

        // Anything a concurrent pass left behind
        report.absorb(self.inner.drain().await);

        info!(
            committed = report.committed,
            failed = report.failed,
            "Catalog pipeline stopped"
        );
        report
    }

    pub fn stats(&self) -> PipelineStats {
        let counters = &self.inner.counters;
        PipelineStats {
            records_appended: counters.records_appended.load(Ordering::Relaxed),
            batches_sealed: counters.batches_sealed.load(Ordering::Relaxed),
            items_committed: counters.items_committed.load(Ordering::Relaxed),
            items_failed: counters.items_failed.load(Ordering::Relaxed),
            empty_batches_skipped: counters.empty_batches_skipped.load(Ordering::Relaxed),
            open_records: self.inner.buffer.open_len(),
            sealed_batches: self.inner.buffer.sealed_len(),
        }
    }

    fn spawn_idle_flush(&self) {
        let weak = Arc::downgrade(&self.inner);
        let cancel = self.inner.cancel.clone();
        let period = self.inner.config.flush_period;

        self.inner
            .tasks
            .spawn_on(run_idle_flush(weak, cancel, period), &self.inner.runtime);
    }
}

impl Inner {
    fn trigger_drain(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        self.tasks.spawn_on(
            async move {
                inner.drain().await;
            },
            &self.runtime,
        );
    }

    fn flush_open(&self) -> u64 {
        let sequence_num = self.buffer.seal();
        self.counters.batches_sealed.fetch_add(1, Ordering::Relaxed);
        sequence_num
    }

    #[cfg(test)]
    fn run_ring_empty_hook(&self) {
        let hook = self.ring_empty_hook.lock().unwrap().take();
        if let Some(hook) = hook {
            hook(self);
        }
    }

    async fn drain(&self) -> DrainReport {
        let mut report = DrainReport::default();

        loop {
            let Some(guard) = self.gate.try_close() else {
                if !report.admitted {
                    trace!("Another pass is committing to catalog, skipping");
                }
                break;
            };
            report.admitted = true;

            while let Some(batch) = self.buffer.pop_sealed() {
                self.commit_batch(batch, &mut report).await;
            }

            #[cfg(test)]
            self.run_ring_empty_hook();

            drop(guard);

            // A batch sealed after the ring was seen empty but before the gate
            // reopened would otherwise wait for the next trigger.
            if self.buffer.sealed_len() == 0 {
                break;
            }
        }

        report
    }

    async fn commit_batch(&self, batch: Batch, report: &mut DrainReport) {
        let sequence_num = batch.sequence_num;

        let Some(item) = CatalogItem::from_batch(batch) else {
            trace!(sequence_num, "Skipping empty batch");
            report.skipped_empty += 1;
            self.counters.empty_batches_skipped.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let record_count = item.len();
        let item_id = item.item_id;

        match self.write_item(item).await {
            Ok(()) => {
                debug!(
                    sequence_num,
                    item_id = %item_id,
                    records = record_count,
                    "Committed catalog item"
                );
                report.committed += 1;
                report.records_committed += record_count;
                self.counters.items_committed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                error!(
                    sequence_num,
                    item_id = %item_id,
                    records = record_count,
                    error = %e,
                    "Failed to commit catalog item, dropping batch"
                );
                report.failed += 1;
                self.counters.items_failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    async fn write_item(&self, item: CatalogItem) -> Result<(), SinkError> {
        self.sink.add(item)?;
        self.sink.commit().await
    }
}

async fn run_idle_flush(weak: Weak<Inner>, cancel: CancellationToken, period: Duration) {
    let mut interval = tokio::time::interval(idle_check_interval(period));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let Some(inner) = weak.upgrade() else {
            break;
        };

        let idle = inner.buffer.idle_for();
        if idle >= period {
            let pending = inner.buffer.open_len();
            if pending > 0 {
                warn!(
                    idle_ms = idle.as_millis() as u64,
                    pending, "Service has been idle, flushing open batch to catalog"
                );
            } else {
                trace!(idle_ms = idle.as_millis() as u64, "Idle flush with empty batch");
            }
            inner.flush_open();
            inner.trigger_drain();
        }
    }

    debug!("Idle flush task stopped");
}

fn idle_check_interval(period: Duration) -> Duration {
    (period / 4).clamp(Duration::from_millis(5), Duration::from_secs(1))
}

use crate::catalog::batch::Batch;
use crate::package::StatsRecord;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Outcome of appending a record to the open batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Record joined the open batch
    Buffered,
    /// Record filled the open batch, which was sealed with this sequence number
    Sealed(u64),
    /// Buffer was closed for shutdown; the record was not taken
    Closed,
}

/// The open batch plus the ring of sealed batches awaiting commit.
///
/// Sealing swaps the open batch out and enqueues it under the open-batch lock,
/// so ring order always matches sealing order and no record can land in a
/// batch after it has been sealed.
pub struct BatchBuffer {
    capacity: usize,
    open: Mutex<OpenBatch>,
    ring: Mutex<VecDeque<Batch>>,
}

struct OpenBatch {
    records: Vec<StatsRecord>,
    next_sequence: u64,
    last_activity: Instant,
    closed: bool,
}

impl BatchBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            open: Mutex::new(OpenBatch {
                records: Vec::with_capacity(capacity),
                next_sequence: 0,
                last_activity: Instant::now(),
                closed: false,
            }),
            ring: Mutex::new(VecDeque::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Add a record to the open batch, sealing it once it reaches capacity.
    pub fn append(&self, record: StatsRecord) -> AppendOutcome {
        let mut open = lock(&self.open);
        if open.closed {
            return AppendOutcome::Closed;
        }

        open.records.push(record);
        open.last_activity = Instant::now();

        if open.records.len() >= self.capacity {
            AppendOutcome::Sealed(self.seal_locked(&mut open))
        } else {
            AppendOutcome::Buffered
        }
    }

    /// Seal the open batch regardless of its size (it may be empty).
    /// Resets the idle clock.
    pub fn seal(&self) -> u64 {
        let mut open = lock(&self.open);
        open.last_activity = Instant::now();
        self.seal_locked(&mut open)
    }

    /// Refuse further appends and seal whatever is left in the open batch.
    ///
    /// Returns `None` when the buffer was already closed.
    pub fn close(&self) -> Option<u64> {
        let mut open = lock(&self.open);
        if open.closed {
            return None;
        }
        open.closed = true;
        Some(self.seal_locked(&mut open))
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.open).closed
    }

    /// Take the oldest sealed batch off the ring.
    pub fn pop_sealed(&self) -> Option<Batch> {
        lock(&self.ring).pop_front()
    }

    pub fn sealed_len(&self) -> usize {
        lock(&self.ring).len()
    }

    pub fn open_len(&self) -> usize {
        lock(&self.open).records.len()
    }

    /// Time since the last append or seal.
    pub fn idle_for(&self) -> Duration {
        lock(&self.open).last_activity.elapsed()
    }

    fn seal_locked(&self, open: &mut OpenBatch) -> u64 {
        let records = std::mem::replace(&mut open.records, Vec::with_capacity(self.capacity));
        let sequence_num = open.next_sequence;
        open.next_sequence += 1;

        lock(&self.ring).push_back(Batch {
            sequence_num,
            records,
        });

        sequence_num
    }
}

// A panic while holding either lock leaves the data structurally intact
// (push/pop/replace only), so poisoned locks are recovered.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{DownloadEvent, PackageInfo};
    use chrono::Utc;
    use std::collections::HashSet;
    use std::sync::{Arc, Barrier};

    fn make_record(id: &str) -> StatsRecord {
        let event = DownloadEvent {
            id: id.to_string(),
            version: "1.0.0".to_string(),
            ip_address: None,
            user_agent: None,
            operation: None,
            dependent_package: None,
            project_guids: None,
        };
        StatsRecord::new(Utc::now(), &event, PackageInfo::default())
    }

    #[test]
    fn test_append_seals_at_capacity() {
        let buffer = BatchBuffer::new(5);

        for i in 0..4 {
            assert_eq!(buffer.append(make_record(&i.to_string())), AppendOutcome::Buffered);
        }
        assert_eq!(buffer.sealed_len(), 0);

        assert_eq!(buffer.append(make_record("4")), AppendOutcome::Sealed(0));
        assert_eq!(buffer.sealed_len(), 1);
        assert_eq!(buffer.open_len(), 0);

        let batch = buffer.pop_sealed().unwrap();
        assert_eq!(batch.sequence_num, 0);
        assert_eq!(batch.len(), 5);
        let ids: Vec<_> = batch.records.iter().map(|r| r.package_id.as_str()).collect();
        assert_eq!(ids, vec!["0", "1", "2", "3", "4"]);
    }

    #[test]
    fn test_seal_empty_batch() {
        let buffer = BatchBuffer::new(10);

        assert_eq!(buffer.seal(), 0);
        assert_eq!(buffer.seal(), 1);

        let first = buffer.pop_sealed().unwrap();
        assert!(first.is_empty());
        assert_eq!(buffer.pop_sealed().unwrap().sequence_num, 1);
        assert!(buffer.pop_sealed().is_none());
    }

    #[test]
    fn test_ring_is_fifo() {
        let buffer = BatchBuffer::new(2);

        for i in 0..6 {
            buffer.append(make_record(&i.to_string()));
        }
        buffer.append(make_record("partial"));
        buffer.seal();

        let sequence: Vec<u64> = std::iter::from_fn(|| buffer.pop_sealed())
            .map(|b| b.sequence_num)
            .collect();
        assert_eq!(sequence, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_close_rejects_appends() {
        let buffer = BatchBuffer::new(10);
        buffer.append(make_record("kept"));

        assert_eq!(buffer.close(), Some(0));
        assert!(buffer.is_closed());
        assert_eq!(buffer.append(make_record("rejected")), AppendOutcome::Closed);

        let batch = buffer.pop_sealed().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.records[0].package_id, "kept");
        assert!(buffer.pop_sealed().is_none());

        assert_eq!(buffer.close(), None);
        assert_eq!(buffer.sealed_len(), 0);
    }

    #[test]
    fn test_seal_resets_idle_clock() {
        let buffer = BatchBuffer::new(10);
        std::thread::sleep(Duration::from_millis(30));
        assert!(buffer.idle_for() >= Duration::from_millis(30));

        buffer.seal();
        assert!(buffer.idle_for() < Duration::from_millis(30));
    }

    #[test]
    fn test_concurrent_appends_at_capacity_boundary() {
        // Buffer sits at capacity-minus-one when all producers fire at once
        let producers = 32;
        let buffer = Arc::new(BatchBuffer::new(10));
        for i in 0..9 {
            buffer.append(make_record(&format!("seed-{}", i)));
        }

        let barrier = Arc::new(Barrier::new(producers));
        let handles: Vec<_> = (0..producers)
            .map(|i| {
                let buffer = Arc::clone(&buffer);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    buffer.append(make_record(&format!("producer-{}", i)));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        buffer.seal();

        let mut seen = HashSet::new();
        let mut total = 0;
        while let Some(batch) = buffer.pop_sealed() {
            assert!(batch.len() <= 10);
            for record in batch.records {
                total += 1;
                assert!(seen.insert(record.package_id), "record appeared twice");
            }
        }

        assert_eq!(total, 9 + producers);
        assert_eq!(seen.len(), 9 + producers);
    }
}

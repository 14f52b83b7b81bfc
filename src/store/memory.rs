//! In-memory record store

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::RecordStore;
use crate::PersistError;
use crate::types::IndexedRecord;

/// Append-only log held in memory.
///
/// Useful for tests and diagnostics. It can simulate a flaky backend by failing
/// a number of upcoming appends and a slow one by sleeping inside each append.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<Arc<IndexedRecord>>>,
    fail_next: AtomicUsize,
    append_calls: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    latency: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `latency` inside every append.
    pub fn with_latency(latency: Duration) -> Self {
        Self { latency: Some(latency), ..Self::default() }
    }

    /// Make the next `count` appends fail with [`PersistError::Unavailable`].
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Snapshot of everything appended so far.
    pub fn records(&self) -> Vec<Arc<IndexedRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Frame indices appended so far, in append order.
    pub fn frame_indices(&self) -> Vec<u64> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|r| r.frame_index)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `append_batch` calls, successful or not.
    pub fn append_calls(&self) -> u64 {
        self.append_calls.load(Ordering::SeqCst)
    }

    /// Highest number of appends that were ever running at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RecordStore for MemoryStore {
    async fn append_batch(&self, records: &[Arc<IndexedRecord>]) -> Result<(), PersistError> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PersistError::unavailable("simulated store outage"));
        }

        self.records.lock().unwrap_or_else(PoisonError::into_inner).extend_from_slice(records);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::indexed_record;

    #[tokio::test]
    async fn appends_in_order_and_fails_on_request() {
        let store = MemoryStore::new();
        let batch: Vec<_> = (0..3).map(|i| Arc::new(indexed_record(i))).collect();

        store.fail_next(1);
        assert!(store.append_batch(&batch).await.is_err());
        assert!(store.is_empty());

        store.append_batch(&batch).await.unwrap();
        assert_eq!(store.frame_indices(), vec![0, 1, 2]);
        assert_eq!(store.append_calls(), 2);
    }
}

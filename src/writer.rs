//! Interval-flushed buffered writer
//!
//! Records accumulate in memory and are handed to the [`RecordStore`] in one
//! batch per flush interval:
//!
//! - `accumulate` is a short lock and a push; it never waits on the store
//! - a flush swaps the pending batch for an empty one and appends it
//! - only one flush runs at a time; a flush requested while another is in
//!   flight waits for it, so the store sees batches in accumulation order
//! - a failed batch is put back in front of anything accumulated since and is
//!   offered again on the next flush
//!
//! The writer remembers the highest frame index the store has acknowledged and
//! never offers a record at or below it again. One writer serves one stream.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::PersistError;
use crate::store::RecordStore;
use crate::types::IndexedRecord;

/// Counters describing the writer's progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Successful non-empty flushes
    pub flushes: u64,
    /// Flushes the store rejected
    pub failed_flushes: u64,
    /// Records acknowledged by the store
    pub records_written: u64,
    /// Records waiting for the next flush
    pub pending: usize,
}

/// Final state of a writer task after shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterReport {
    pub stats: WriterStats,
    /// Records left unwritten because the final flush failed
    pub unflushed: usize,
}

/// Buffers records and appends them to a store in batches.
pub struct BufferedWriter {
    pending: Mutex<Vec<Arc<IndexedRecord>>>,
    /// Held for the whole duration of a flush; value is the acknowledged high-water mark
    in_flight: tokio::sync::Mutex<Option<u64>>,
    store: Arc<dyn RecordStore>,
    flushes: AtomicU64,
    failed_flushes: AtomicU64,
    records_written: AtomicU64,
}

impl std::fmt::Debug for BufferedWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedWriter").field("stats", &self.stats()).finish_non_exhaustive()
    }
}

impl BufferedWriter {
    pub fn new<S: RecordStore>(store: S) -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            in_flight: tokio::sync::Mutex::new(None),
            store: Arc::new(store),
            flushes: AtomicU64::new(0),
            failed_flushes: AtomicU64::new(0),
            records_written: AtomicU64::new(0),
        }
    }

    /// Add a record to the pending batch.
    pub fn accumulate(&self, record: Arc<IndexedRecord>) {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).push(record);
    }

    /// Records waiting for the next flush.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn stats(&self) -> WriterStats {
        WriterStats {
            flushes: self.flushes.load(Ordering::Relaxed),
            failed_flushes: self.failed_flushes.load(Ordering::Relaxed),
            records_written: self.records_written.load(Ordering::Relaxed),
            pending: self.pending_len(),
        }
    }

    /// Append everything pending to the store.
    ///
    /// Waits for any flush already in flight first. Returns the number of
    /// records the store acknowledged. On failure the batch is kept for the
    /// next flush.
    pub async fn flush(&self) -> Result<usize, PersistError> {
        let mut acknowledged = self.in_flight.lock().await;

        let mut batch =
            std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner));
        if let Some(high_water) = *acknowledged {
            let before = batch.len();
            batch.retain(|r| r.frame_index > high_water);
            if batch.len() != before {
                debug!(skipped = before - batch.len(), "Dropped records already acknowledged");
            }
        }

        if batch.is_empty() {
            return Ok(0);
        }

        match self.store.append_batch(&batch).await {
            Ok(()) => {
                let written = batch.len();
                *acknowledged = batch.iter().map(|r| r.frame_index).max().max(*acknowledged);
                self.flushes.fetch_add(1, Ordering::Relaxed);
                self.records_written.fetch_add(written as u64, Ordering::Relaxed);
                debug!(records = written, "Flushed batch");
                Ok(written)
            }
            Err(e) => {
                self.failed_flushes.fetch_add(1, Ordering::Relaxed);
                let retained = batch.len();
                {
                    let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
                    let newer = std::mem::replace(&mut *pending, batch);
                    pending.extend(newer);
                }
                if e.is_retryable() {
                    warn!(records = retained, "Flush failed, batch kept for retry: {}", e);
                } else {
                    error!(records = retained, "Store rejected batch, kept for retry: {}", e);
                }
                Err(e)
            }
        }
    }

    /// Run the periodic flush until `cancel` fires, then flush once more.
    ///
    /// A tick that comes due while a flush is still running is delayed rather
    /// than run concurrently. Cancellation never interrupts a flush in flight,
    /// and no interval flush starts once it has fired.
    pub fn spawn(
        self: Arc<Self>,
        period: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<WriterReport> {
        tokio::spawn(async move {
            info!("Writer task started (flush every {:?})", period);
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        // failures are logged inside flush and retried next tick
                        let _ = self.flush().await;
                    }
                }
            }

            let unflushed = match self.flush().await {
                Ok(_) => 0,
                Err(e) => {
                    error!("Final flush failed, {} records unwritten: {}", self.pending_len(), e);
                    self.pending_len()
                }
            };

            let stats = self.stats();
            info!(
                "Writer task ended ({} records written in {} flushes)",
                stats.records_written, stats.flushes
            );
            WriterReport { stats, unflushed }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::test_utils::indexed_record;

    fn record(idx: u64) -> Arc<IndexedRecord> {
        Arc::new(indexed_record(idx))
    }

    #[tokio::test]
    async fn flush_hands_over_pending_batch() {
        let store = Arc::new(MemoryStore::new());
        let writer = BufferedWriter::new(Arc::clone(&store));

        writer.accumulate(record(0));
        writer.accumulate(record(1));
        assert_eq!(writer.flush().await.unwrap(), 2);
        assert_eq!(writer.pending_len(), 0);
        assert_eq!(store.frame_indices(), vec![0, 1]);

        assert_eq!(writer.flush().await.unwrap(), 0);
        assert_eq!(store.append_calls(), 1, "empty flush must not touch the store");
    }

    #[tokio::test]
    async fn failed_batch_is_retried_before_newer_records() {
        let store = Arc::new(MemoryStore::new());
        let writer = BufferedWriter::new(Arc::clone(&store));

        store.fail_next(1);
        writer.accumulate(record(0));
        writer.accumulate(record(1));
        assert!(writer.flush().await.is_err());
        assert_eq!(writer.pending_len(), 2);

        writer.accumulate(record(2));
        assert_eq!(writer.flush().await.unwrap(), 3);
        assert_eq!(store.frame_indices(), vec![0, 1, 2]);

        let stats = writer.stats();
        assert_eq!(stats.failed_flushes, 1);
        assert_eq!(stats.flushes, 1);
        assert_eq!(stats.records_written, 3);
    }

    #[tokio::test]
    async fn acknowledged_records_are_not_written_twice() {
        let store = Arc::new(MemoryStore::new());
        let writer = BufferedWriter::new(Arc::clone(&store));

        writer.accumulate(record(0));
        writer.accumulate(record(1));
        writer.flush().await.unwrap();

        writer.accumulate(record(1));
        writer.accumulate(record(2));
        assert_eq!(writer.flush().await.unwrap(), 1);
        assert_eq!(store.frame_indices(), vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_flushes_do_not_overlap() {
        let store = Arc::new(MemoryStore::with_latency(Duration::from_millis(100)));
        let writer = Arc::new(BufferedWriter::new(Arc::clone(&store)));

        writer.accumulate(record(0));
        let first = {
            let writer = Arc::clone(&writer);
            tokio::spawn(async move { writer.flush().await })
        };
        while store.append_calls() == 0 {
            tokio::task::yield_now().await;
        }
        writer.accumulate(record(1));
        let second = writer.flush().await.unwrap();

        assert_eq!(first.await.unwrap().unwrap(), 1);
        assert_eq!(second, 1);
        assert_eq!(store.frame_indices(), vec![0, 1]);
        assert_eq!(store.peak_concurrency(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_task_flushes_and_drains_on_shutdown() {
        let store = Arc::new(MemoryStore::new());
        let writer = Arc::new(BufferedWriter::new(Arc::clone(&store)));
        let cancel = CancellationToken::new();
        let handle = Arc::clone(&writer).spawn(Duration::from_secs(5), cancel.clone());

        writer.accumulate(record(0));
        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert!(store.is_empty(), "flush is time driven, not count driven");

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(store.frame_indices(), vec![0]);

        writer.accumulate(record(1));
        cancel.cancel();
        let report = handle.await.unwrap();

        assert_eq!(store.frame_indices(), vec![0, 1]);
        assert_eq!(report.unflushed, 0);
        assert_eq!(report.stats.records_written, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_lets_in_flight_flush_finish() {
        let store = Arc::new(MemoryStore::with_latency(Duration::from_secs(2)));
        let writer = Arc::new(BufferedWriter::new(Arc::clone(&store)));
        let cancel = CancellationToken::new();
        let handle = Arc::clone(&writer).spawn(Duration::from_secs(1), cancel.clone());

        writer.accumulate(record(0));
        // tick at 1s starts a 2s append
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        writer.accumulate(record(1));
        cancel.cancel();

        let report = handle.await.unwrap();
        assert_eq!(store.frame_indices(), vec![0, 1]);
        assert_eq!(store.peak_concurrency(), 1);
        assert_eq!(report.stats.flushes, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn outage_keeps_records_until_store_recovers() {
        let store = Arc::new(MemoryStore::new());
        let writer = Arc::new(BufferedWriter::new(Arc::clone(&store)));
        let cancel = CancellationToken::new();
        let handle = Arc::clone(&writer).spawn(Duration::from_secs(1), cancel.clone());

        store.fail_next(3);
        for idx in 0..4 {
            writer.accumulate(record(idx));
            tokio::time::sleep(Duration::from_millis(1_001)).await;
        }
        cancel.cancel();
        let report = handle.await.unwrap();

        assert_eq!(store.frame_indices(), vec![0, 1, 2, 3]);
        assert_eq!(report.stats.failed_flushes, 3);
        assert_eq!(report.unflushed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_final_flush_reports_what_was_left() {
        let store = Arc::new(MemoryStore::new());
        let writer = Arc::new(BufferedWriter::new(Arc::clone(&store)));
        let cancel = CancellationToken::new();
        let handle = Arc::clone(&writer).spawn(Duration::from_secs(5), cancel.clone());

        for idx in 0..3 {
            writer.accumulate(record(idx));
        }
        store.fail_next(1);
        cancel.cancel();

        let report = handle.await.unwrap();
        assert_eq!(report.unflushed, 3);
        assert_eq!(report.stats.pending, 3);
        assert_eq!(report.stats.failed_flushes, 1);
        assert_eq!(report.stats.records_written, 0);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn no_interval_flush_starts_after_cancel() {
        let store = Arc::new(MemoryStore::with_latency(Duration::from_secs(2)));
        let writer = Arc::new(BufferedWriter::new(Arc::clone(&store)));
        let cancel = CancellationToken::new();
        let handle = Arc::clone(&writer).spawn(Duration::from_secs(1), cancel.clone());

        writer.accumulate(record(0));
        // the tick at 1s starts a 2s append; the 2s tick is overdue when it returns
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        writer.accumulate(record(1));
        cancel.cancel();

        // at 4s the append for record 1 is in flight; it has to be the final one
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        store.fail_next(1);

        let report = handle.await.unwrap();
        assert_eq!(store.append_calls(), 2);
        assert_eq!(store.frame_indices(), vec![0]);
        assert_eq!(report.unflushed, 1);
    }
}

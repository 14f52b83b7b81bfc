//! Monitor handle for one oximeter stream

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinError;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::MonitorConfig;
use crate::driver::{DistributorReport, Driver, DriverTasks};
use crate::pipeline::{Pipeline, PipelineStats};
use crate::provider::PacketSource;
use crate::session::{Mailboxes, SessionFeed, SessionRegistry};
use crate::store::RecordStore;
use crate::stream::ThrottleExt;
use crate::types::{IndexedRecord, SessionKey, UpdateRate, VitalsSample};
use crate::writer::{BufferedWriter, WriterReport, WriterStats};
use crate::{OxilinkError, Result};

/// A joined live session.
#[derive(Debug)]
pub struct Session {
    pub key: SessionKey,
    /// Most recent records at join time, oldest first
    pub replay: Vec<Arc<IndexedRecord>>,
    /// False when the key was already joined
    pub created: bool,
    /// Records published after the replay, each exactly once
    pub feed: SessionFeed,
}

/// Point-in-time counters for a running monitor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub pipeline: PipelineStats,
    pub writer: WriterStats,
    pub sessions: usize,
}

/// Final counters returned by [`Monitor::shutdown`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub pipeline: PipelineStats,
    pub distributor: DistributorReport,
    pub writer: WriterReport,
}

impl ShutdownReport {
    /// Records the store acknowledged over the monitor's lifetime.
    pub fn records_written(&self) -> u64 {
        self.writer.stats.records_written
    }

    /// Records still buffered because the final flush failed.
    pub fn unflushed(&self) -> usize {
        self.writer.unflushed
    }
}

/// Running monitor: decode chain, session fan-out and buffered persistence.
///
/// Dropping the monitor cancels its tasks without draining the source; the
/// writer still attempts one final flush. Use [`Monitor::shutdown`] to wait for that flush and get the counters.
pub struct Monitor {
    registry: Arc<SessionRegistry<Arc<Mailboxes>>>,
    mailboxes: Arc<Mailboxes>,
    writer: Arc<BufferedWriter>,
    vitals: watch::Receiver<Option<VitalsSample>>,
    stats: watch::Receiver<PipelineStats>,
    drain: CancellationToken,
    cancel: CancellationToken,
    writer_cancel: CancellationToken,
    tasks: Option<DriverTasks>,
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor").field("stats", &self.stats()).finish_non_exhaustive()
    }
}

impl Monitor {
    /// Validate `config` and start processing packets from `source`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<P, S>(source: P, store: S, config: MonitorConfig) -> Result<Self>
    where
        P: PacketSource,
        S: RecordStore,
    {
        config.validate()?;
        let pipeline = Pipeline::from_config(&config)?;

        let mailboxes = Arc::new(Mailboxes::new(config.mailbox_capacity));
        let registry = Arc::new(SessionRegistry::new(config.replay_capacity, Arc::clone(&mailboxes)));
        let writer = Arc::new(BufferedWriter::new(store));

        let channels =
            Driver::spawn(source, pipeline, Arc::clone(&registry), Arc::clone(&writer), &config);

        info!(
            "Monitor started (marker {}, {} segments per frame, flush every {:?})",
            config.start_marker,
            config.segments_per_frame,
            config.flush_interval()
        );

        Ok(Self {
            registry,
            mailboxes,
            writer,
            vitals: channels.vitals,
            stats: channels.stats,
            drain: channels.drain,
            cancel: channels.cancel,
            writer_cancel: channels.writer_cancel,
            tasks: Some(channels.tasks),
        })
    }

    /// Join a live session.
    ///
    /// The returned replay holds the recent backlog; the feed then yields every
    /// later record exactly once. Joining a key that is already joined replaces
    /// its feed and keeps its delivery position.
    pub fn join(&self, key: impl Into<SessionKey>) -> Session {
        let key = key.into();
        // open first so nothing published after the snapshot can miss the feed
        let feed = self.mailboxes.open(key.clone());
        let snapshot = self.registry.join(key.clone());
        Session { key, replay: snapshot.records, created: snapshot.created, feed }
    }

    /// Leave a session. Unknown keys are ignored; returns whether it existed.
    pub fn leave(&self, key: &SessionKey) -> bool {
        let left = self.registry.leave(key);
        let closed = self.mailboxes.close(key);
        left || closed
    }

    /// Stream of the latest vitals readings.
    ///
    /// With [`UpdateRate::Max`] readings that arrive faster than the rate are
    /// coalesced, newest wins. The stream ends when the packet source ends.
    pub fn vitals(&self, rate: UpdateRate) -> impl Stream<Item = VitalsSample> + Send + 'static {
        let latest = WatchStream::new(self.vitals.clone()).filter_map(|v| async move { v });

        match rate.throttle_interval() {
            None => latest.boxed(),
            Some(period) => latest.throttle(period).boxed(),
        }
    }

    /// Most recent vitals reading, if any.
    pub fn latest_vitals(&self) -> Option<VitalsSample> {
        *self.vitals.borrow()
    }

    pub fn stats(&self) -> MonitorStats {
        MonitorStats {
            pipeline: *self.stats.borrow(),
            writer: self.writer.stats(),
            sessions: self.registry.session_count(),
        }
    }

    /// Number of joined sessions.
    pub fn session_count(&self) -> usize {
        self.registry.session_count()
    }

    /// Stop accepting packets, drain the decode chain and flush the writer.
    ///
    /// Packets the source already accepted are decoded and persisted; a frame
    /// left incomplete is counted as abandoned. A flush already in progress
    /// completes before the final flush runs.
    pub async fn shutdown(mut self) -> Result<ShutdownReport> {
        let Some(tasks) = self.tasks.take() else {
            return Err(OxilinkError::shutdown("monitor"));
        };

        info!("Shutting down monitor");
        self.drain.cancel();
        let pipeline = tasks.decode.await.map_err(|e| task_failed("decode", e))?;
        let distributor = tasks.distributor.await.map_err(|e| task_failed("distributor", e))?;

        self.writer_cancel.cancel();
        let writer = tasks.writer.await.map_err(|e| task_failed("writer", e))?;

        info!(
            "Monitor stopped ({} records, {} written, {} unflushed)",
            pipeline.records, writer.stats.records_written, writer.unflushed
        );
        Ok(ShutdownReport { pipeline, distributor, writer })
    }

    /// [`Monitor::shutdown`] with an upper bound on how long it may take.
    ///
    /// On timeout the monitor is dropped, which cancels its tasks outright.
    pub async fn shutdown_within(self, limit: Duration) -> Result<ShutdownReport> {
        tokio::time::timeout(limit, self.shutdown())
            .await
            .map_err(|_| OxilinkError::Timeout { duration: limit })?
    }
}

fn task_failed(component: &str, err: JoinError) -> OxilinkError {
    error!("{} task failed: {}", component, err);
    OxilinkError::shutdown(format!("{} task", component))
}

impl Drop for Monitor {
    fn drop(&mut self) {
        debug!("Dropping monitor");
        self.drain.cancel();
        self.cancel.cancel();
        self.writer_cancel.cancel();
    }
}

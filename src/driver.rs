//! Driver spawns and manages the processing tasks
//!
//! Three tasks run per monitor:
//!
//! - **decode**: owns the [`PacketSource`] and the [`Pipeline`]; every record
//!   is handed to the writer and broadcast to the distributor
//! - **distributor**: publishes broadcast records to the session registry
//! - **writer**: periodic flush of the [`BufferedWriter`]
//!
//! Neither consumer can slow the decode task down. The writer hand-off is a
//! short push; the broadcast drops the oldest records for a distributor that
//! falls more than `handoff_capacity` behind.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::MonitorConfig;
use crate::pipeline::{Pipeline, PipelineStats};
use crate::provider::PacketSource;
use crate::session::{Deliver, SessionRegistry};
use crate::types::{IndexedRecord, VitalsSample};
use crate::writer::{BufferedWriter, WriterReport};

/// Consecutive source errors tolerated before the decode task gives up.
const MAX_ERRORS: u32 = 10;

/// What the distributor did before its input closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DistributorReport {
    /// Records handed to the registry
    pub published: u64,
    /// Records skipped because the distributor fell behind
    pub skipped: u64,
}

/// Join handles of the spawned tasks.
#[derive(Debug)]
pub struct DriverTasks {
    pub decode: JoinHandle<PipelineStats>,
    pub distributor: JoinHandle<DistributorReport>,
    pub writer: JoinHandle<WriterReport>,
}

/// Result of spawning driver tasks
#[derive(Debug)]
pub struct DriverChannels {
    /// Latest vitals reading, `None` until the first one arrives
    pub vitals: watch::Receiver<Option<VitalsSample>>,
    /// Pipeline counters, updated after every packet
    pub stats: watch::Receiver<PipelineStats>,
    /// Closes the source; the decode task ends once the accepted packets are
    /// processed and the distributor follows
    pub drain: CancellationToken,
    /// Stops the decode task at once, dropping packets the source still holds
    pub cancel: CancellationToken,
    /// Stops the writer after one final flush
    pub writer_cancel: CancellationToken,
    pub tasks: DriverTasks,
}

/// Where the decode task hands its output.
struct DecodeSinks {
    writer: Arc<BufferedWriter>,
    records_tx: broadcast::Sender<Arc<IndexedRecord>>,
    vitals_tx: watch::Sender<Option<VitalsSample>>,
    stats_tx: watch::Sender<PipelineStats>,
}

/// Driver spawns and manages the processing tasks.
pub struct Driver;

impl Driver {
    /// Spawn the decode, distributor and writer tasks.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<P, D>(
        source: P,
        pipeline: Pipeline,
        registry: Arc<SessionRegistry<D>>,
        writer: Arc<BufferedWriter>,
        config: &MonitorConfig,
    ) -> DriverChannels
    where
        P: PacketSource,
        D: Deliver,
    {
        let (vitals_tx, vitals_rx) = watch::channel(None);
        let (stats_tx, stats_rx) = watch::channel(pipeline.stats());
        // subscribe before the decode task can send
        let (records_tx, records_rx) = broadcast::channel(config.handoff_capacity.max(1));

        let drain = CancellationToken::new();
        let cancel = CancellationToken::new();
        let writer_cancel = CancellationToken::new();

        let writer_task = Arc::clone(&writer).spawn(config.flush_interval(), writer_cancel.clone());
        let distributor = tokio::spawn(Self::distributor_task(records_rx, registry));

        let (drain_decode, cancel_decode) = (drain.clone(), cancel.clone());
        let sinks = DecodeSinks { writer, records_tx, vitals_tx, stats_tx };
        let decode = tokio::spawn(Self::decode_task(source, pipeline, sinks, drain_decode, cancel_decode));

        DriverChannels {
            vitals: vitals_rx,
            stats: stats_rx,
            drain,
            cancel,
            writer_cancel,
            tasks: DriverTasks { decode, distributor, writer: writer_task },
        }
    }

    /// Decode task - reads packets and runs them through the pipeline
    async fn decode_task<P>(
        mut source: P,
        mut pipeline: Pipeline,
        sinks: DecodeSinks,
        drain: CancellationToken,
        cancel: CancellationToken,
    ) -> PipelineStats
    where
        P: PacketSource,
    {
        let DecodeSinks { writer, records_tx, vitals_tx, stats_tx } = sinks;
        info!("Decode task started");
        let mut error_count = 0u32;
        let mut draining = false;

        loop {
            if cancel.is_cancelled() {
                info!("Decode task cancelled");
                break;
            }

            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Decode task cancelled while waiting for a packet");
                    break;
                }
                _ = drain.cancelled(), if !draining => None,
                result = source.next_packet() => Some(result),
            };

            let Some(result) = next else {
                info!("Draining packet source");
                source.close();
                draining = true;
                continue;
            };

            match result {
                Ok(Some(packet)) => {
                    error_count = 0;

                    if let Some(record) = pipeline.ingest(packet) {
                        let record = Arc::new(record);
                        trace!(frame = record.frame_index, "Record decoded");

                        writer.accumulate(Arc::clone(&record));
                        if let Some(vitals) = record.vitals {
                            vitals_tx.send_replace(Some(vitals));
                        }
                        // no receiver only means the distributor already exited
                        if records_tx.send(record).is_err() {
                            debug!("Distributor gone, record not published");
                        }
                    }

                    stats_tx.send_replace(pipeline.stats());
                }
                Ok(None) => {
                    info!("Packet source ended");
                    break;
                }
                Err(e) => {
                    error_count += 1;
                    error!("Packet source error ({}/{}): {}", error_count, MAX_ERRORS, e);

                    if error_count >= MAX_ERRORS {
                        error!("Too many packet source errors, stopping decode");
                        break;
                    }

                    // Exponential backoff: 100ms, 200ms, 400ms, ... capped at 1.6s
                    let backoff = Duration::from_millis(50 * (1 << error_count.min(5)));
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }

        pipeline.finish();
        let stats = pipeline.stats();
        stats_tx.send_replace(stats);
        info!(
            "Decode task ended ({} packets, {} records, {} frames abandoned)",
            stats.raw_packets, stats.records, stats.frames_abandoned
        );
        stats
    }

    /// Distributor task - publishes records to sessions until the decode task ends
    async fn distributor_task<D: Deliver>(
        mut records_rx: broadcast::Receiver<Arc<IndexedRecord>>,
        registry: Arc<SessionRegistry<D>>,
    ) -> DistributorReport {
        debug!("Distributor task started");
        let mut report = DistributorReport::default();

        loop {
            match records_rx.recv().await {
                Ok(record) => {
                    registry.publish(record);
                    report.published += 1;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Distributor fell behind, skipped {} records", skipped);
                    report.skipped += skipped;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }

        debug!(
            "Distributor task ended ({} published, {} skipped)",
            report.published, report.skipped
        );
        report
    }
}

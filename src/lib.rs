//! Streaming decoder and fan-out for pulse oximeter telemetry.
//!
//! Oxilink turns the notification payloads of a BM-series pulse oximeter into
//! ordered waveform samples and vitals readings, shares them with any number
//! of live viewer sessions and persists them in batches.
//!
//! # Features
//!
//! - **Reassembly**: groups `K` notifications starting with the frame marker
//!   into frames and discards noise
//! - **Decoding**: configurable waveform ranges and vitals offsets, with the
//!   device's validity bounds
//! - **Sessions**: late joiners get a bounded backlog, then every live record
//!   exactly once; slow viewers lose their oldest records, never stall others
//! - **Persistence**: interval flushed batches, retried on failure, never
//!   written twice
//!
//! # Data flow
//!
//! ```text
//! PacketSource ─► decode task (reassemble ─► decode ─► index)
//!                     │                 │
//!                     ▼                 ▼
//!             BufferedWriter       distributor ─► SessionRegistry ─► SessionFeed
//!                     │
//!                     ▼
//!               RecordStore
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use oxilink::{MonitorConfig, Oxilink, UpdateRate};
//! use oxilink::store::CsvStore;
//!
//! #[tokio::main]
//! async fn main() -> oxilink::Result<()> {
//!     let store = CsvStore::open("recordings")?;
//!     let monitor = Oxilink::replay("capture.txt", store, MonitorConfig::default()).await?;
//!
//!     let mut session = monitor.join("bedside");
//!     tokio::spawn(async move {
//!         while let Some(record) = session.feed.recv().await {
//!             println!("frame {}: {} channels", record.frame_index, record.channels.len());
//!         }
//!     });
//!
//!     let mut vitals = monitor.vitals(UpdateRate::Max(1));
//!     while let Some(v) = vitals.next().await {
//!         println!("SpO2 {}% pulse {} bpm (valid: {})", v.spo2, v.pulse, v.valid);
//!     }
//!
//!     let report = monitor.shutdown().await?;
//!     println!("{} records written", report.records_written());
//!     Ok(())
//! }
//! ```

mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Decode chain
pub mod decoder;
pub mod indexer;
pub mod pipeline;
pub mod reassembler;

// Fan-out and persistence
pub mod session;
pub mod store;
pub mod writer;

// Stream-based runtime
pub mod config;
pub mod driver;
pub mod logging;
pub mod monitor;
pub mod provider;
pub mod providers;
pub mod stream;

// Core exports
pub use error::*;
pub use types::*;

// Main API exports
pub use config::MonitorConfig;
pub use monitor::{Monitor, MonitorStats, Session, ShutdownReport};
pub use pipeline::{Pipeline, PipelineStats};
pub use provider::PacketSource;
pub use providers::{CaptureSource, ChannelSource};
pub use store::RecordStore;

/// Unified entry point for starting monitors.
///
/// # Examples
///
/// ## Live link
/// ```rust,no_run
/// use oxilink::{MonitorConfig, Oxilink, RawPacket};
/// use oxilink::store::MemoryStore;
/// use tokio::sync::mpsc;
///
/// #[tokio::main]
/// async fn main() -> oxilink::Result<()> {
///     let (tx, rx) = mpsc::channel::<RawPacket>(256);
///     let monitor = Oxilink::attach(rx, MemoryStore::new(), MonitorConfig::default()).await?;
///     // the transport adapter forwards every notification payload
///     tx.send(RawPacket::from([170, 76, 65, 104])).await.ok();
///     monitor.shutdown().await?;
///     Ok(())
/// }
/// ```
pub struct Oxilink;

impl Oxilink {
    /// Start a monitor fed by a transport adapter through `packets`.
    ///
    /// The monitor's source ends when every sender is dropped.
    pub async fn attach<S: RecordStore>(
        packets: tokio::sync::mpsc::Receiver<RawPacket>,
        store: S,
        config: MonitorConfig,
    ) -> Result<Monitor> {
        Monitor::start(ChannelSource::new(packets), store, config)
    }

    /// Start a monitor replaying a text capture as fast as it decodes.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, a line is not a list of
    /// decimal bytes, or `config` is invalid.
    pub async fn replay<P: AsRef<std::path::Path>, S: RecordStore>(
        capture: P,
        store: S,
        config: MonitorConfig,
    ) -> Result<Monitor> {
        Monitor::start(CaptureSource::open(capture)?, store, config)
    }
}

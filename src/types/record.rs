//! Decoded and indexed record types
//!
//! A [`DecodedRecord`] is what the decoder can say about one frame in isolation.
//! The indexer turns it into an [`IndexedRecord`] by placing the frame on the
//! stream's sample and frame counters. Everything downstream (sessions, stores)
//! works with indexed records shared behind an `Arc`.

use serde::{Deserialize, Serialize};

/// One frame's worth of samples for a single waveform channel, before indexing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct ChannelRun {
    pub channel: String,
    pub values: Vec<u8>,
}

/// Vitals bytes read from a frame with their validity verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct Vitals {
    pub spo2: u8,
    pub pulse: u8,
    /// False when either value sits on or outside its sentinel bounds
    pub valid: bool,
}

/// Output of decoding one frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct DecodedRecord {
    /// Waveform runs in layout channel order
    pub channels: Vec<ChannelRun>,
    /// Present whenever the layout defines vitals
    pub vitals: Option<Vitals>,
    /// Device rolling frame counter, when the layout locates one
    pub sequence: Option<u8>,
}

impl DecodedRecord {
    /// Total waveform samples across all channels.
    pub fn sample_count(&self) -> usize {
        self.channels.iter().map(|run| run.values.len()).sum()
    }
}

/// A single waveform sample positioned on its channel's sample counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct WaveformSample {
    pub index: u64,
    pub value: u8,
}

/// A channel run placed on the channel's sample counter.
///
/// Samples are stored as a contiguous run: sample `i` has index `start_index + i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct IndexedChannel {
    pub channel: String,
    pub start_index: u64,
    pub values: Vec<u8>,
}

impl IndexedChannel {
    /// Iterate the run as individual samples.
    pub fn samples(&self) -> impl Iterator<Item = WaveformSample> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(|(i, &value)| WaveformSample { index: self.start_index + i as u64, value })
    }

    /// Index one past the last sample of this run.
    pub fn end_index(&self) -> u64 {
        self.start_index + self.values.len() as u64
    }
}

/// Vitals positioned on the stream's frame counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct VitalsSample {
    pub frame_index: u64,
    pub spo2: u8,
    pub pulse: u8,
    pub valid: bool,
}

/// A decoded frame placed on the stream's counters.
///
/// `frame_index` increases by exactly one per decoded frame and is the ordering
/// key used for session delivery markers and store deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct IndexedRecord {
    pub frame_index: u64,
    pub channels: Vec<IndexedChannel>,
    pub vitals: Option<VitalsSample>,
    pub sequence: Option<u8>,
    /// Wall-clock capture time in milliseconds since the Unix epoch.
    /// Informational only; never used for ordering.
    pub captured_at_ms: u64,
}

impl IndexedRecord {
    /// Look up a channel run by name.
    pub fn channel(&self, name: &str) -> Option<&IndexedChannel> {
        self.channels.iter().find(|c| c.channel == name)
    }

    /// Stamp the wall-clock capture time.
    pub fn with_capture_time(mut self, at: std::time::SystemTime) -> Self {
        self.captured_at_ms = at
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self
    }
}

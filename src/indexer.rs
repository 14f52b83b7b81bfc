//! Sample and frame index assignment
//!
//! Packet arrival times jitter, so positions in the stream come from counting
//! rather than clocks. Every waveform channel has its own sample counter, and
//! the stream has one frame counter that advances once per decoded frame
//! whether or not its vitals are valid. Consumers derive the waveform/vitals
//! ratio from these two counters instead of assuming one.
//!
//! Correct indices require frames in arrival order; the transport is trusted
//! to preserve it.

use std::collections::HashMap;

use tracing::debug;

use crate::types::{DecodedRecord, IndexedChannel, IndexedRecord, VitalsSample};

/// Counters kept by the indexer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexerStats {
    /// Frames indexed
    pub frames: u64,
    /// Frames whose vitals were present but invalid
    pub invalid_vitals: u64,
    /// Times the device frame counter did not advance by exactly one
    pub sequence_gaps: u64,
    /// Frames the device counter says were skipped (forward jumps only)
    pub frames_missed: u64,
}

/// Assigns monotonically increasing indices to decoded records.
#[derive(Debug, Default)]
pub struct SampleIndexer {
    sample_counters: HashMap<String, u64>,
    frame_counter: u64,
    last_sequence: Option<u8>,
    stats: IndexerStats,
}

impl SampleIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a decoded record on the stream counters.
    pub fn index(&mut self, record: DecodedRecord) -> IndexedRecord {
        let frame_index = self.frame_counter;
        self.frame_counter += 1;
        self.stats.frames += 1;

        let channels = record
            .channels
            .into_iter()
            .map(|run| {
                let counter = self.sample_counters.entry(run.channel.clone()).or_insert(0);
                let start_index = *counter;
                *counter += run.values.len() as u64;
                IndexedChannel { channel: run.channel, start_index, values: run.values }
            })
            .collect();

        let vitals = record.vitals.map(|v| {
            if !v.valid {
                self.stats.invalid_vitals += 1;
            }
            VitalsSample { frame_index, spo2: v.spo2, pulse: v.pulse, valid: v.valid }
        });

        if let Some(sequence) = record.sequence {
            self.track_sequence(sequence);
        }

        IndexedRecord { frame_index, channels, vitals, sequence: record.sequence, captured_at_ms: 0 }
    }

    fn track_sequence(&mut self, sequence: u8) {
        if let Some(previous) = self.last_sequence {
            let step = sequence.wrapping_sub(previous);
            if step != 1 {
                self.stats.sequence_gaps += 1;
                if (2..=128).contains(&step) {
                    self.stats.frames_missed += u64::from(step - 1);
                }
                debug!(previous, sequence, "Device frame counter discontinuity");
            }
        }
        self.last_sequence = Some(sequence);
    }

    /// Next sample index for a channel.
    pub fn next_sample_index(&self, channel: &str) -> u64 {
        self.sample_counters.get(channel).copied().unwrap_or(0)
    }

    /// Next frame index.
    pub fn next_frame_index(&self) -> u64 {
        self.frame_counter
    }

    /// Restart all counters for a new stream.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn stats(&self) -> IndexerStats {
        self.stats
    }
}

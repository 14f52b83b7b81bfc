//! Producer-side decode chain: reassemble, decode, index
//!
//! A [`Pipeline`] owns one stream's reassembler and indexer. It is plain
//! synchronous state with no locks; the driver runs it on a single task so
//! packets are processed strictly in arrival order. Each stream of packets
//! gets its own pipeline.

use std::time::SystemTime;

use tracing::debug;

use crate::config::MonitorConfig;
use crate::decoder::FrameDecoder;
use crate::indexer::SampleIndexer;
use crate::reassembler::FrameReassembler;
use crate::types::{FrameLayout, IndexedRecord, RawPacket};
use crate::Result;

/// Combined counters for one stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub raw_packets: u64,
    pub ignored_packets: u64,
    pub frames_completed: u64,
    pub frames_abandoned: u64,
    /// Complete frames shorter than the layout requires
    pub frames_malformed: u64,
    /// Records produced by the chain
    pub records: u64,
    pub invalid_vitals: u64,
    pub sequence_gaps: u64,
    pub frames_missed: u64,
}

/// Reassembler, decoder and indexer for one packet stream.
#[derive(Debug)]
pub struct Pipeline {
    reassembler: FrameReassembler,
    decoder: FrameDecoder,
    indexer: SampleIndexer,
    frames_malformed: u64,
}

impl Pipeline {
    /// Build a pipeline; fails if the layout is invalid.
    pub fn new(start_marker: u8, segments_per_frame: usize, layout: FrameLayout) -> Result<Self> {
        Ok(Self {
            reassembler: FrameReassembler::new(start_marker, segments_per_frame),
            decoder: FrameDecoder::new(layout)?,
            indexer: SampleIndexer::new(),
            frames_malformed: 0,
        })
    }

    /// Build a pipeline from configuration values.
    pub fn from_config(config: &MonitorConfig) -> Result<Self> {
        Self::new(config.start_marker, config.segments_per_frame, config.layout.clone())
    }

    /// Feed one packet, stamping any completed record with the current time.
    pub fn ingest(&mut self, raw: RawPacket) -> Option<IndexedRecord> {
        self.ingest_at(raw, SystemTime::now())
    }

    /// Feed one packet with an explicit capture time.
    pub fn ingest_at(&mut self, raw: RawPacket, captured_at: SystemTime) -> Option<IndexedRecord> {
        let frame = self.reassembler.ingest(raw)?;

        let Some(decoded) = self.decoder.decode(&frame) else {
            self.frames_malformed += 1;
            debug!(
                len = frame.len(),
                required = self.decoder.minimum_length(),
                "Frame shorter than layout, dropped"
            );
            return None;
        };

        Some(self.indexer.index(decoded).with_capture_time(captured_at))
    }

    /// Drop any partial frame and restart the counters.
    pub fn reset(&mut self) {
        self.reassembler.reset();
        self.indexer.reset();
    }

    /// End of stream; a partial frame is counted as abandoned.
    pub fn finish(&mut self) {
        self.reassembler.finish();
    }

    /// The layout frames are decoded with.
    pub fn layout(&self) -> &FrameLayout {
        self.decoder.layout()
    }

    pub fn stats(&self) -> PipelineStats {
        let reassembly = self.reassembler.stats();
        let indexing = self.indexer.stats();
        PipelineStats {
            raw_packets: reassembly.raw_packets,
            ignored_packets: reassembly.ignored_packets,
            frames_completed: reassembly.frames_completed,
            frames_abandoned: reassembly.frames_abandoned,
            frames_malformed: self.frames_malformed,
            records: indexing.frames,
            invalid_vitals: indexing.invalid_vitals,
            sequence_gaps: indexing.sequence_gaps,
            frames_missed: indexing.frames_missed,
        }
    }
}

//! Frame reassembly from notification segments
//!
//! The oximeter splits each frame over `K` notifications. Only the first one is
//! recognisable (it starts with the start marker); continuation segments carry
//! no header. Reassembly is therefore a tiny state machine:
//!
//! - a start-marker packet always opens a fresh frame, abandoning any frame in
//!   progress
//! - any other packet is appended to the frame in progress, or ignored if no
//!   frame has been opened yet
//! - once `K` segments are held they are emitted as one [`Frame`]
//!
//! A frame interrupted by a new start marker is lost. There is no way to ask
//! the device for the missing segments, so this is counted, not repaired.
//! Packets must be fed in arrival order.

use tracing::{debug, trace};

use crate::types::{Frame, RawPacket};

/// Counters describing what the reassembler did with its input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblerStats {
    /// Every packet passed to `ingest`
    pub raw_packets: u64,
    /// Empty packets and continuation packets seen before any start marker
    pub ignored_packets: u64,
    /// Frames emitted
    pub frames_completed: u64,
    /// Frames discarded because a start marker arrived before `K` segments
    pub frames_abandoned: u64,
}

/// Groups raw packets into fixed-size frames.
#[derive(Debug)]
pub struct FrameReassembler {
    start_marker: u8,
    segments_per_frame: usize,
    segments: Vec<RawPacket>,
    stats: ReassemblerStats,
}

impl FrameReassembler {
    /// Create a reassembler for frames of `segments_per_frame` packets.
    ///
    /// A segment count of zero is treated as one.
    pub fn new(start_marker: u8, segments_per_frame: usize) -> Self {
        let segments_per_frame = segments_per_frame.max(1);
        Self {
            start_marker,
            segments_per_frame,
            segments: Vec::with_capacity(segments_per_frame),
            stats: ReassemblerStats::default(),
        }
    }

    /// Feed one packet; returns a frame when this packet completes one.
    pub fn ingest(&mut self, raw: RawPacket) -> Option<Frame> {
        self.stats.raw_packets += 1;

        let Some(first) = raw.first() else {
            self.stats.ignored_packets += 1;
            return None;
        };

        if first == self.start_marker {
            if !self.segments.is_empty() {
                self.stats.frames_abandoned += 1;
                debug!(
                    held = self.segments.len(),
                    expected = self.segments_per_frame,
                    "Start marker before frame completed, dropping partial frame"
                );
                self.segments.clear();
            }
            self.segments.push(raw);
        } else if !self.segments.is_empty() {
            self.segments.push(raw);
        } else {
            trace!(len = raw.len(), "Continuation packet without start marker ignored");
            self.stats.ignored_packets += 1;
            return None;
        }

        if self.segments.len() == self.segments_per_frame {
            let frame = Frame::from_segments(&self.segments);
            self.segments.clear();
            self.stats.frames_completed += 1;
            trace!(len = frame.len(), "Frame reassembled");
            return Some(frame);
        }

        None
    }

    /// Drop any frame in progress. Counters are kept.
    pub fn reset(&mut self) {
        self.segments.clear();
    }

    /// End of stream: a frame in progress can no longer complete and is
    /// counted as abandoned. Returns whether one was dropped.
    pub fn finish(&mut self) -> bool {
        if self.segments.is_empty() {
            return false;
        }
        debug!(
            held = self.segments.len(),
            expected = self.segments_per_frame,
            "Stream ended mid-frame, dropping partial frame"
        );
        self.segments.clear();
        self.stats.frames_abandoned += 1;
        true
    }

    /// Number of segments held for the frame in progress.
    pub fn pending_segments(&self) -> usize {
        self.segments.len()
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> ReassemblerStats {
        self.stats
    }

    /// Configured start marker.
    pub fn start_marker(&self) -> u8 {
        self.start_marker
    }

    /// Configured segments per frame.
    pub fn segments_per_frame(&self) -> usize {
        self.segments_per_frame
    }
}

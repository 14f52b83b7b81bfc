//! Test utilities for building packet streams and records
//!
//! Shared by unit tests and the benchmarks, so every helper works on plain
//! values and never touches the filesystem.

#![cfg(any(test, feature = "benchmark"))]

use crate::types::{FrameLayout, IndexedChannel, IndexedRecord, RawPacket, VitalsSample};

/// Start marker used by every helper.
pub const START_MARKER: u8 = 170;

/// Layout with one ten-sample channel at 5..15, SpO2 at 16 and pulse at 17.
pub fn end_to_end_layout() -> FrameLayout {
    FrameLayout::builder()
        .channel("pleth", 5..15)
        .vitals(16, 17)
        .build()
        .unwrap_or_else(|_| FrameLayout::single_channel())
}

/// Four segments forming an 18-byte frame for [`end_to_end_layout`].
pub fn end_to_end_segments(spo2: u8, pulse: u8) -> Vec<RawPacket> {
    vec![
        RawPacket::from([START_MARKER, 1, 1, 1, 1]),
        RawPacket::from([9, 9, 9, 9, 9]),
        RawPacket::from([9, 9, 9, 9, 9]),
        RawPacket::from([0, spo2, pulse]),
    ]
}

/// Split a frame into `segments` packets of near-equal length.
///
/// Continuation packets must not begin with the start marker, so callers
/// should keep the bytes at segment boundaries away from it.
pub fn segment_frame(frame: &[u8], segments: usize) -> Vec<RawPacket> {
    let segments = segments.max(1);
    let chunk = frame.len().div_ceil(segments).max(1);
    frame.chunks(chunk).map(RawPacket::from).collect()
}

/// An 80-byte frame for [`FrameLayout::dual_channel`] with a ramp waveform.
pub fn dual_channel_frame(sequence: u8, spo2: u8, pulse: u8) -> Vec<u8> {
    let mut frame: Vec<u8> = (0..80u8).map(|i| i % 100 + 1).collect();
    frame[0] = START_MARKER;
    frame[3] = sequence;
    frame[36] = spo2;
    frame[37] = pulse;
    frame
}

/// A small indexed record with valid vitals for registry and writer tests.
pub fn indexed_record(frame_index: u64) -> IndexedRecord {
    IndexedRecord {
        frame_index,
        channels: vec![IndexedChannel {
            channel: "pleth".to_string(),
            start_index: frame_index * 3,
            values: vec![10, 20, 30],
        }],
        vitals: Some(VitalsSample { frame_index, spo2: 97, pulse: 64, valid: true }),
        sequence: Some(frame_index as u8),
        captured_at_ms: 1_700_000_000_000 + frame_index * 250,
    }
}

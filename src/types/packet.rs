//! Raw notification payloads and reassembled frames

use std::sync::Arc;

/// One notification payload exactly as the transport delivered it.
///
/// Immutable once received. The payload is reference counted so a packet can be
/// logged or captured without copying while the reassembler holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    bytes: Arc<[u8]>,
}

impl RawPacket {
    /// Wrap a payload.
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self { bytes: bytes.into() }
    }

    /// Payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// First byte, if any.
    pub fn first(&self) -> Option<u8> {
        self.bytes.first().copied()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<Vec<u8>> for RawPacket {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&[u8]> for RawPacket {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes)
    }
}

impl<const N: usize> From<[u8; N]> for RawPacket {
    fn from(bytes: [u8; N]) -> Self {
        Self::new(bytes.to_vec())
    }
}

/// A complete transmission unit: `K` segments concatenated in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Arc<[u8]>,
    segments: usize,
}

impl Frame {
    /// Concatenate segments into a frame.
    pub fn from_segments(segments: &[RawPacket]) -> Self {
        let total = segments.iter().map(RawPacket::len).sum();
        let mut data = Vec::with_capacity(total);
        for segment in segments {
            data.extend_from_slice(segment.as_bytes());
        }
        Self { data: data.into(), segments: segments.len() }
    }

    /// Frame bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Number of segments the frame was built from.
    pub fn segment_count(&self) -> usize {
        self.segments
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

//! Core types for oximeter telemetry.
//!
//! ## Data flow
//!
//! - [`RawPacket`] is one notification payload from the transport
//! - [`Frame`] is `K` consecutive packets glued together by the reassembler
//! - [`FrameLayout`] says where the waveform runs and vitals bytes sit in a frame
//! - [`DecodedRecord`] is the decoder's view of one frame
//! - [`IndexedRecord`] is a decoded frame placed on the stream's sample and
//!   frame counters, and is the unit shared with sessions and stores
//!
//! ## Usage Example
//!
//! ```rust
//! use oxilink::types::{FrameLayout, RawPacket, Frame};
//!
//! let layout = FrameLayout::builder()
//!     .channel("pleth", 5..15)
//!     .vitals(16, 17)
//!     .build()
//!     .unwrap();
//!
//! let frame = Frame::from_segments(&[
//!     RawPacket::from([170, 1, 1, 1, 1]),
//!     RawPacket::from([9, 9, 9, 9, 9]),
//!     RawPacket::from([9, 9, 9, 9, 9]),
//!     RawPacket::from([0, 98, 72]),
//! ]);
//! assert_eq!(frame.len(), layout.minimum_length());
//! ```

mod layout;
mod packet;
mod record;
mod session_key;
mod update_rate;

pub use layout::{
    ByteRange, ChannelLayout, FrameLayout, FrameLayoutBuilder, OpenBounds, VitalsBounds,
    VitalsLayout,
};
pub use packet::{Frame, RawPacket};
pub use record::{
    ChannelRun, DecodedRecord, IndexedChannel, IndexedRecord, Vitals, VitalsSample,
    WaveformSample,
};
pub use session_key::SessionKey;
pub use update_rate::UpdateRate;

//! Packet source implementations

mod capture;
mod channel;

pub use capture::CaptureSource;
pub use channel::ChannelSource;

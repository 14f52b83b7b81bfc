//! Packet source trait

use crate::Result;
use crate::types::RawPacket;

/// Source of raw link-layer notification payloads.
///
/// A source hands over payloads in arrival order and owns its own timing: a
/// live transport waits for the device, a capture replay paces itself.
#[async_trait::async_trait]
pub trait PacketSource: Send + 'static {
    /// Wait for the next notification payload.
    ///
    /// Returns:
    /// - `Ok(Some(packet))` - payload received
    /// - `Ok(None)` - the source ended normally
    /// - `Err(e)` - read failed; the driver retries with backoff
    async fn next_packet(&mut self) -> Result<Option<RawPacket>>;

    /// Stop accepting new payloads.
    ///
    /// Payloads already accepted are still handed out by `next_packet`, which
    /// then returns `Ok(None)`. The default does nothing, so a source without
    /// a way to stop intake must end on its own for a graceful shutdown.
    fn close(&mut self) {}
}

#[async_trait::async_trait]
impl<S: PacketSource + ?Sized> PacketSource for Box<S> {
    async fn next_packet(&mut self) -> Result<Option<RawPacket>> {
        (**self).next_packet().await
    }

    fn close(&mut self) {
        (**self).close()
    }
}

//! Channel-fed packet source
//!
//! The transport adapter owns the radio link and pushes every notification
//! payload into the sending half. The source ends when all senders are gone.

use tokio::sync::mpsc;
use tracing::debug;

use crate::Result;
use crate::provider::PacketSource;
use crate::types::RawPacket;

/// Packet source reading from an mpsc channel.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<RawPacket>,
    received: u64,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<RawPacket>) -> Self {
        Self { rx, received: 0 }
    }

    /// Create a bounded channel and the source reading from it.
    pub fn channel(capacity: usize) -> (mpsc::Sender<RawPacket>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self::new(rx))
    }

    /// Payloads handed out so far.
    pub fn received(&self) -> u64 {
        self.received
    }
}

#[async_trait::async_trait]
impl PacketSource for ChannelSource {
    async fn next_packet(&mut self) -> Result<Option<RawPacket>> {
        match self.rx.recv().await {
            Some(packet) => {
                self.received += 1;
                Ok(Some(packet))
            }
            None => {
                debug!("Packet channel closed after {} payloads", self.received);
                Ok(None)
            }
        }
    }

    fn close(&mut self) {
        debug!(queued = self.rx.len(), "Closing packet channel");
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn yields_payloads_then_ends_when_senders_drop() {
        let (tx, mut source) = ChannelSource::channel(4);
        tx.send(RawPacket::from([170u8, 1, 2])).await.unwrap();
        tx.send(RawPacket::from([3u8])).await.unwrap();
        drop(tx);

        assert_eq!(source.next_packet().await.unwrap().unwrap().as_bytes(), &[170, 1, 2]);
        assert_eq!(source.next_packet().await.unwrap().unwrap().as_bytes(), &[3]);
        assert!(source.next_packet().await.unwrap().is_none());
        assert_eq!(source.received(), 2);
    }

    #[tokio::test]
    async fn close_hands_out_queued_payloads_then_ends() {
        let (tx, mut source) = ChannelSource::channel(4);
        tx.send(RawPacket::from([170u8, 1])).await.unwrap();
        tx.send(RawPacket::from([2u8])).await.unwrap();

        source.close();
        assert!(tx.send(RawPacket::from([3u8])).await.is_err(), "closed source accepts nothing new");

        assert_eq!(source.next_packet().await.unwrap().unwrap().as_bytes(), &[170, 1]);
        assert_eq!(source.next_packet().await.unwrap().unwrap().as_bytes(), &[2]);
        assert!(source.next_packet().await.unwrap().is_none());
    }
}

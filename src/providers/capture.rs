//! Capture replay source
//!
//! Replays notification payloads recorded as text, one payload per line with
//! each byte written in decimal:
//!
//! ```text
//! # device BM1000, 2024-03-02
//! 170 76 65 104 0 3 1 2
//! 9 9 9 9 9 9 9 9
//! ```
//!
//! Blank lines and lines starting with `#` are skipped. The whole capture is
//! parsed up front so a malformed line is reported before anything is replayed.

use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use tokio::time::{Interval, MissedTickBehavior, interval};
use tracing::{debug, info};

use crate::provider::PacketSource;
use crate::types::RawPacket;
use crate::{OxilinkError, Result};

/// Packet source replaying a text capture.
#[derive(Debug)]
pub struct CaptureSource {
    packets: VecDeque<RawPacket>,
    total: usize,
    pacing: Option<Interval>,
}

impl CaptureSource {
    /// Read and parse a capture file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| OxilinkError::file_error(path.to_path_buf(), e))?;
        let source = Self::parse(&text, &path.display().to_string())?;
        info!("Opened capture {}: {} payloads", path.display(), source.total);
        Ok(source)
    }

    /// Parse a capture held in memory.
    pub fn from_text(text: &str) -> Result<Self> {
        Self::parse(text, "capture")
    }

    /// Replay from already decoded payloads.
    pub fn from_packets(packets: impl IntoIterator<Item = RawPacket>) -> Self {
        let packets: VecDeque<_> = packets.into_iter().collect();
        Self { total: packets.len(), packets, pacing: None }
    }

    /// Hand out at most one payload per `period` instead of as fast as possible.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_pacing(mut self, period: Duration) -> Self {
        if period.is_zero() {
            self.pacing = None;
        } else {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.pacing = Some(ticker);
        }
        self
    }

    /// Payloads in the capture.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Payloads not yet handed out.
    pub fn remaining(&self) -> usize {
        self.packets.len()
    }

    fn parse(text: &str, name: &str) -> Result<Self> {
        let mut packets = VecDeque::new();

        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let bytes = line
                .split_whitespace()
                .map(|token| {
                    token.parse::<u8>().map_err(|e| {
                        OxilinkError::parse(
                            format!("{} line {}", name, number + 1),
                            format!("'{}' is not a byte value: {}", token, e),
                        )
                    })
                })
                .collect::<Result<Vec<u8>>>()?;

            packets.push_back(RawPacket::from(bytes));
        }

        debug!("Parsed {} payloads from {}", packets.len(), name);
        Ok(Self::from_packets(packets))
    }
}

#[async_trait::async_trait]
impl PacketSource for CaptureSource {
    async fn next_packet(&mut self) -> Result<Option<RawPacket>> {
        if self.packets.is_empty() {
            debug!("Capture replay finished ({} payloads)", self.total);
            return Ok(None);
        }

        if let Some(pacing) = self.pacing.as_mut() {
            pacing.tick().await;
        }

        Ok(self.packets.pop_front())
    }

    fn close(&mut self) {
        if !self.packets.is_empty() {
            debug!("Capture replay stopped with {} of {} payloads left", self.packets.len(), self.total);
            self.packets.clear();
        }
    }
}

//! Monitor configuration
//!
//! All values have working defaults for the four-segment BM-series frames, so an
//! empty YAML document is a valid configuration.
//!
//! ```rust
//! use oxilink::MonitorConfig;
//!
//! let config = MonitorConfig::from_yaml_str("
//! flush_interval_ms: 1000
//! replay_capacity: 20
//! ").unwrap();
//! assert_eq!(config.segments_per_frame, 4);
//! assert_eq!(config.replay_capacity, 20);
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::types::FrameLayout;
use crate::{OxilinkError, Result};

/// Default start-of-frame marker byte.
pub const DEFAULT_START_MARKER: u8 = 170;
/// Default number of notifications per frame.
pub const DEFAULT_SEGMENTS_PER_FRAME: usize = 4;

/// Configuration values consumed by the pipeline, registry and writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    /// First byte of the first segment of every frame
    pub start_marker: u8,
    /// Segments per frame (`K`)
    pub segments_per_frame: usize,
    /// Field offsets inside a frame
    pub layout: FrameLayout,
    /// Buffered writer flush period in milliseconds
    pub flush_interval_ms: u64,
    /// Records kept for replay to newly joined sessions (`M`)
    pub replay_capacity: usize,
    /// Per-session delivery queue length before the oldest record is dropped
    pub mailbox_capacity: usize,
    /// Queue between the decode task and the distributor
    pub handoff_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            start_marker: DEFAULT_START_MARKER,
            segments_per_frame: DEFAULT_SEGMENTS_PER_FRAME,
            layout: FrameLayout::default(),
            flush_interval_ms: 5_000,
            replay_capacity: 50,
            mailbox_capacity: 256,
            handoff_capacity: 1024,
        }
    }
}

impl MonitorConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| OxilinkError::file_error(path.to_path_buf(), e))?;
        debug!("Loaded configuration from {}", path.display());
        Self::from_yaml_str(&yaml)
    }

    /// Flush period as a duration.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Check every value is usable.
    pub fn validate(&self) -> Result<()> {
        if self.segments_per_frame == 0 {
            return Err(OxilinkError::config("segments_per_frame", "must be at least 1"));
        }
        if self.flush_interval_ms == 0 {
            return Err(OxilinkError::config("flush_interval_ms", "must be greater than zero"));
        }
        if self.replay_capacity == 0 {
            return Err(OxilinkError::config("replay_capacity", "must be greater than zero"));
        }
        if self.mailbox_capacity == 0 {
            return Err(OxilinkError::config("mailbox_capacity", "must be greater than zero"));
        }
        if self.handoff_capacity == 0 {
            return Err(OxilinkError::config("handoff_capacity", "must be greater than zero"));
        }
        self.layout.validate()
    }
}

//! Update rate control for live vitals viewers

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How often a live viewer wants vitals updates.
///
/// The device emits vitals once per frame, which is faster than a display
/// needs. Throttled viewers get the latest reading once per period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum UpdateRate {
    /// Latest reading, unthrottled. Readings that arrive before the consumer
    /// polls are merged, so a slow reader sees only the newest one
    #[default]
    EveryFrame,

    /// At most this many updates per second (0 behaves like `EveryFrame`)
    Max(u32),
}

impl UpdateRate {
    /// Throttle period, or `None` when the stream is unthrottled.
    pub fn throttle_interval(self) -> Option<Duration> {
        match self {
            UpdateRate::EveryFrame | UpdateRate::Max(0) => None,
            UpdateRate::Max(hz) => Some(Duration::from_secs_f64(1.0 / hz as f64)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_interval_matches_rate() {
        assert_eq!(UpdateRate::EveryFrame.throttle_interval(), None);
        assert_eq!(UpdateRate::Max(0).throttle_interval(), None);
        assert_eq!(UpdateRate::Max(4).throttle_interval(), Some(Duration::from_millis(250)));
    }
}

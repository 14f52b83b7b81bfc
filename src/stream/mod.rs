//! Stream combinators for live viewers

mod throttle;

pub use throttle::{Throttle, ThrottleExt};

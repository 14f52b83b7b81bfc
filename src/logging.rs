//! Tracing subscriber setup for applications embedding the monitor

use tracing_subscriber::EnvFilter;

/// Install a formatted tracing subscriber.
///
/// `RUST_LOG` takes precedence over `default_filter`. Returns `false` if a
/// global subscriber was already installed, which leaves it in place.
///
/// ```rust
/// oxilink::logging::init_tracing("oxilink=info");
/// ```
pub fn init_tracing(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init().is_ok()
}

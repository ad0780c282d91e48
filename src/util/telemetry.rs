//! Tracing subscriber setup.
//!
//! The library only emits `tracing` events; installing a subscriber is the
//! application's call. These helpers cover the common cases.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "prometheus_gatekeeper=info";

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install a formatted subscriber filtered by `RUST_LOG`, falling back to
/// [`DEFAULT_FILTER`]. Does nothing if a global subscriber already exists.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(DEFAULT_FILTER))
        .with_target(true)
        .try_init();
}

/// Like [`init_tracing`] but writes through the test harness so output is
/// captured per test. Defaults to `debug` for this crate.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter("prometheus_gatekeeper=debug"))
        .with_test_writer()
        .try_init();
}

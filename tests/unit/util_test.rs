//! Tests for shared utilities

use prometheus_gatekeeper::util::{init_tracing, now_ms};

#[test]
fn test_init_tracing_is_repeatable() {
    init_tracing();
    init_tracing();
    tracing::info!(target: "prometheus_gatekeeper", "tracing initialized");
}

#[test]
fn test_now_ms_advances() {
    let a = now_ms();
    std::thread::sleep(std::time::Duration::from_millis(2));
    assert!(now_ms() > a);
}

//! Tests for error classification

use std::time::Duration;

use prometheus_gatekeeper::core::{ErrorKind, InvokeError, SchedulerError};

#[test]
fn test_transient_kinds() {
    for kind in [
        ErrorKind::Timeout,
        ErrorKind::Connection,
        ErrorKind::RateLimited,
        ErrorKind::ServerBusy,
    ] {
        assert!(kind.is_transient(), "{kind} should be transient");
    }
    for kind in [ErrorKind::InvalidInput, ErrorKind::Unauthorized, ErrorKind::Internal] {
        assert!(!kind.is_transient(), "{kind} should be permanent");
    }
}

#[test]
fn test_from_invoke_classifies() {
    assert!(matches!(
        SchedulerError::from_invoke(InvokeError::rate_limited("slow down")),
        SchedulerError::TransientFailure(_)
    ));
    assert!(matches!(
        SchedulerError::from_invoke(InvokeError::invalid_input("bad prompt")),
        SchedulerError::PermanentFailure(_)
    ));
}

#[test]
fn test_scheduler_error_is_transient() {
    assert!(SchedulerError::Timeout(Duration::from_millis(5)).is_transient());
    assert!(SchedulerError::from_invoke(InvokeError::connection("reset")).is_transient());
    assert!(!SchedulerError::QueueFull("svc".into()).is_transient());
    assert!(!SchedulerError::CircuitOpen("svc".into()).is_transient());
    assert!(!SchedulerError::ShuttingDown.is_transient());
}

#[test]
fn test_root_and_display() {
    let err = SchedulerError::RetryBudgetExhausted {
        attempts: 3,
        last: Box::new(SchedulerError::from_invoke(InvokeError::server_busy("503"))),
    };
    assert!(matches!(err.root(), SchedulerError::TransientFailure(e) if e.kind == ErrorKind::ServerBusy));
    assert_eq!(
        err.to_string(),
        "retry budget exhausted after 3 attempts: transient failure: server busy: 503"
    );
    assert_eq!(SchedulerError::QueueFull("gpu".into()).to_string(), "queue full: gpu");
}

#[test]
fn test_invoke_error_serde() {
    let err = InvokeError::new(ErrorKind::RateLimited, "429");
    let json = serde_json::to_string(&err).unwrap();
    assert_eq!(json, r#"{"kind":"rate_limited","message":"429"}"#);
    let back: InvokeError = serde_json::from_str(&json).unwrap();
    assert_eq!(back, err);
}

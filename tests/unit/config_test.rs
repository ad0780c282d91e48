//! Tests for configuration parsing and validation

use std::io::Write;

use prometheus_gatekeeper::config::{
    CircuitBreakerConfig, HealthConfig, ResourceConfig, RetryConfig, SchedulerConfig,
};

#[test]
fn test_resource_config_validation() {
    assert!(ResourceConfig::new(4, 10).validate().is_ok());
    assert!(ResourceConfig::new(0, 10).validate().is_err());
    assert!(ResourceConfig::new(4, 0).validate().is_err());
}

#[test]
fn test_default_scheduler_config() {
    let cfg = SchedulerConfig::default();
    assert!(cfg.validate().is_ok());
    assert!(cfg.auto_register);
    assert_eq!(cfg.default_timeout_ms, 30_000);
    assert_eq!(cfg.retry.max_attempts, 3);
    assert_eq!(cfg.circuit_breaker.failure_threshold, 5);
    assert!(cfg.default_resource.max_concurrency >= 1);
}

#[test]
fn test_from_json_partial() {
    let cfg = SchedulerConfig::from_json_str(
        r#"{
            "auto_register": false,
            "resources": { "llm": { "max_concurrency": 2, "queue_capacity": 16 } },
            "retry": { "max_attempts": 5, "base_delay_ms": 50, "backoff_multiplier": 3.0, "max_delay_ms": 2000 }
        }"#,
    )
    .unwrap();
    assert!(!cfg.auto_register);
    assert_eq!(cfg.resources["llm"], ResourceConfig::new(2, 16));
    assert_eq!(cfg.retry.max_attempts, 5);
    assert_eq!(cfg.circuit_breaker, CircuitBreakerConfig::default());
}

#[test]
fn test_from_json_rejects_invalid_sections() {
    let err = SchedulerConfig::from_json_str(
        r#"{ "resources": { "llm": { "max_concurrency": 0, "queue_capacity": 16 } } }"#,
    )
    .unwrap_err();
    assert!(err.contains("llm"));

    assert!(SchedulerConfig::from_json_str("{ not json").is_err());
    assert!(SchedulerConfig::from_json_str(r#"{ "default_timeout_ms": 0 }"#).is_err());
}

#[test]
fn test_from_json_file() {
    let path = std::env::temp_dir().join(format!("gatekeeper-config-{}.json", std::process::id()));
    let mut file = std::fs::File::create(&path).unwrap();
    write!(file, r#"{{ "shutdown_grace_ms": 250 }}"#).unwrap();
    drop(file);

    let cfg = SchedulerConfig::from_json_file(&path).unwrap();
    assert_eq!(cfg.shutdown_grace_ms, 250);
    std::fs::remove_file(&path).unwrap();

    let err = SchedulerConfig::from_json_file(&path).unwrap_err();
    assert!(format!("{err:#}").contains("reading scheduler config"));
}

#[test]
fn test_section_validation() {
    let retry = RetryConfig {
        max_attempts: 0,
        ..RetryConfig::default()
    };
    assert!(retry.validate().is_err());

    let breaker = CircuitBreakerConfig {
        failure_threshold: 0,
        ..CircuitBreakerConfig::default()
    };
    assert!(breaker.validate().is_err());

    let health = HealthConfig {
        healthy_threshold: 0.4,
        critical_threshold: 0.6,
        ..HealthConfig::default()
    };
    assert!(health.validate().is_err());
}

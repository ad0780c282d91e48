//! Health monitor wired into the scheduler: periodic evaluation, change
//! events and advisory-only behavior.

mod common;

use std::sync::Arc;
use std::time::Duration;

use prometheus_gatekeeper::config::SchedulerConfig;
use prometheus_gatekeeper::core::{
    CircuitState, ErrorKind, HealthStatus, Scheduler, SchedulerError, SubmitOptions,
};
use prometheus_gatekeeper::runtime::api;

use common::{test_config, Job, RecordingInvoker, TestSpawner};

type TestScheduler = Scheduler<Job, String, RecordingInvoker, TestSpawner>;

fn config() -> SchedulerConfig {
    let mut cfg = test_config();
    cfg.retry.max_attempts = 1;
    cfg.circuit_breaker.failure_threshold = 3;
    cfg.circuit_breaker.open_duration_ms = 500;
    cfg.health.interval_ms = 100;
    cfg.health.min_samples = 4;
    cfg
}

fn build(cfg: SchedulerConfig) -> (Arc<RecordingInvoker>, TestScheduler) {
    let invoker = RecordingInvoker::new();
    let scheduler = TestScheduler::new(cfg, Arc::clone(&invoker), TestSpawner).unwrap();
    (invoker, scheduler)
}

async fn fail_times(scheduler: &TestScheduler, resource: &str, count: usize) {
    for i in 0..count {
        let result = scheduler
            .submit(
                resource,
                Job::failing(&format!("{resource}-bad{i}"), 1, ErrorKind::Internal),
                SubmitOptions::default(),
            )
            .unwrap()
            .await;
        assert!(result.is_err());
    }
}

async fn succeed_times(scheduler: &TestScheduler, resource: &str, count: usize) {
    for i in 0..count {
        scheduler
            .submit(resource, Job::ok(&format!("{resource}-ok{i}"), 1), SubmitOptions::default())
            .unwrap()
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_healthy_with_no_traffic() {
    let (_invoker, scheduler) = build(config());
    let report = scheduler.health();
    assert_eq!(report.status, HealthStatus::Healthy);
    assert!(report.resources.is_empty());

    let health = api::health(&scheduler);
    assert!(health.ok);
}

#[tokio::test]
async fn test_degraded_between_thresholds() {
    let mut cfg = config();
    cfg.circuit_breaker.failure_threshold = 100;
    let (_invoker, scheduler) = build(cfg);

    // 7 of 10 succeed: between 0.5 and 0.9.
    succeed_times(&scheduler, "svc", 7).await;
    fail_times(&scheduler, "svc", 3).await;

    let report = scheduler.health();
    assert_eq!(report.status, HealthStatus::Degraded);
    let svc = &report.resources[0];
    assert_eq!(svc.samples, 10);
    assert!((svc.success_rate.unwrap() - 0.7).abs() < 1e-9);
    assert_eq!(report.reasons.len(), 1);
    assert!(report.reasons[0].starts_with("svc:"));
}

#[tokio::test]
async fn test_worst_of_all_resources() {
    let (_invoker, scheduler) = build(config());
    succeed_times(&scheduler, "good", 5).await;
    fail_times(&scheduler, "bad", 3).await;

    assert_eq!(scheduler.breakers().state("bad"), CircuitState::Open);
    let report = scheduler.health();
    assert_eq!(report.status, HealthStatus::Critical);
    let statuses: Vec<_> = report
        .resources
        .iter()
        .map(|r| (r.resource.as_str(), r.status))
        .collect();
    assert_eq!(
        statuses,
        [("bad", HealthStatus::Critical), ("good", HealthStatus::Healthy)]
    );
    assert!(!api::health(&scheduler).ok);
}

#[tokio::test(start_paused = true)]
async fn test_background_monitor_emits_changes() {
    let (_invoker, scheduler) = build(config());
    let mut events = scheduler.subscribe_health();
    scheduler.spawn_health_monitor();

    fail_times(&scheduler, "svc", 3).await;

    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("health event")
        .unwrap();
    assert_eq!(event.previous, HealthStatus::Healthy);
    assert_eq!(event.current, HealthStatus::Critical);
    assert_eq!(event.reasons, ["svc: circuit open"]);

    // Cool-down elapses, the breaker half-opens and a trial call succeeds.
    tokio::time::sleep(Duration::from_millis(600)).await;
    succeed_times(&scheduler, "svc", 2).await;
    assert_eq!(scheduler.breakers().state("svc"), CircuitState::Closed);

    scheduler.shutdown(Duration::from_millis(10)).await;
}

#[tokio::test]
async fn test_health_is_advisory() {
    let mut cfg = config();
    cfg.circuit_breaker.failure_threshold = 100;
    let (_invoker, scheduler) = build(cfg);

    fail_times(&scheduler, "svc", 5).await;
    assert_eq!(scheduler.health().status, HealthStatus::Critical);

    // Critical health does not refuse work; only the breaker would.
    let reply = scheduler
        .submit("svc", Job::ok("still-runs", 1), SubmitOptions::default())
        .unwrap()
        .await;
    assert!(!matches!(reply, Err(SchedulerError::CircuitOpen(_))));
    assert!(reply.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_report_shows_queue_backlog() {
    let (_invoker, scheduler) = build(config());
    scheduler.register_resource("svc", 1, 10).unwrap();

    let handles: Vec<_> = (0..3)
        .map(|i| {
            scheduler
                .submit("svc", Job::ok(&format!("job{i}"), 100), SubmitOptions::default())
                .unwrap()
        })
        .collect();

    let report = scheduler.health();
    let svc = &report.resources[0];
    assert_eq!(svc.resource, "svc");
    assert_eq!(svc.queue_depth, 2);
    assert_eq!(svc.in_flight, 1);
    // A backlog alone is not a health problem.
    assert_eq!(report.status, HealthStatus::Healthy);

    for handle in handles {
        handle.await.unwrap();
    }
    let report = scheduler.health();
    assert_eq!(report.resources[0].queue_depth, 0);
    assert_eq!(report.resources[0].in_flight, 0);
}

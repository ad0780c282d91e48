//! Benchmarks for the scheduler hot paths.
//!
//! Benchmarks cover:
//! - Submission and completion through a single admission queue
//! - Priority-mixed bursts against a small concurrency limit
//! - Circuit breaker admission checks
//! - Backoff delay computation

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use prometheus_gatekeeper::config::{CircuitBreakerConfig, SchedulerConfig};
use prometheus_gatekeeper::core::{
    CircuitBreakerRegistry, InvokeError, Priority, RetryPolicy, Scheduler, SubmitOptions,
    WorkInvoker,
};
use prometheus_gatekeeper::runtime::TokioSpawner;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Payload and Invoker
// ============================================================================

#[derive(Debug, Clone)]
struct BenchPayload {
    id: u64,
}

struct BenchInvoker;

#[async_trait]
impl WorkInvoker<BenchPayload, u64> for BenchInvoker {
    async fn invoke(
        &self,
        _resource: &str,
        payload: BenchPayload,
        _cancel: CancellationToken,
    ) -> Result<u64, InvokeError> {
        Ok(payload.id)
    }
}

type BenchScheduler = Scheduler<BenchPayload, u64, BenchInvoker, TokioSpawner>;

fn build_scheduler(rt: &Runtime, max_concurrency: usize) -> BenchScheduler {
    let mut cfg = SchedulerConfig::default();
    cfg.default_resource.max_concurrency = max_concurrency;
    cfg.default_resource.queue_capacity = 100_000;
    BenchScheduler::new(cfg, Arc::new(BenchInvoker), TokioSpawner::new(rt.handle().clone()))
        .expect("valid bench config")
}

fn priority_for(i: u64) -> Priority {
    match i % 3 {
        0 => Priority::Low,
        1 => Priority::Normal,
        _ => Priority::High,
    }
}

// ============================================================================
// Scheduler Benchmarks
// ============================================================================

fn bench_submit_and_await(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("submit_and_await");

    for concurrency in [1usize, 4, 16] {
        let scheduler = build_scheduler(&rt, concurrency);
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::from_parameter(concurrency),
            &concurrency,
            |b, _| {
                b.to_async(&rt).iter(|| async {
                    let handle = scheduler
                        .submit("bench", BenchPayload { id: 1 }, SubmitOptions::default())
                        .expect("accepted");
                    black_box(handle.await.expect("completed"))
                });
            },
        );
    }
    group.finish();
}

fn bench_priority_burst(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("priority_burst");

    for burst in [10u64, 100, 1_000] {
        let scheduler = build_scheduler(&rt, 2);
        group.throughput(Throughput::Elements(burst));
        group.bench_with_input(BenchmarkId::from_parameter(burst), &burst, |b, &burst| {
            b.to_async(&rt).iter(|| async {
                let handles: Vec<_> = (0..burst)
                    .map(|id| {
                        scheduler
                            .submit(
                                "bench",
                                BenchPayload { id },
                                SubmitOptions::with_priority(priority_for(id)),
                            )
                            .expect("accepted")
                    })
                    .collect();
                black_box(join_all(handles).await)
            });
        });
    }
    group.finish();
}

// ============================================================================
// Resilience Benchmarks
// ============================================================================

fn bench_breaker_admission(c: &mut Criterion) {
    let registry = CircuitBreakerRegistry::new(CircuitBreakerConfig::default());
    registry.get("bench");

    c.bench_function("breaker_should_allow_closed", |b| {
        b.iter(|| black_box(registry.should_allow_operation(black_box("bench"))));
    });

    c.bench_function("breaker_record_success", |b| {
        b.iter(|| registry.record_outcome(black_box("bench"), true));
    });
}

fn bench_backoff_delay(c: &mut Criterion) {
    let policy = RetryPolicy::default();
    c.bench_function("delay_for_retry", |b| {
        b.iter(|| {
            for attempt in 1..=10 {
                black_box(policy.delay_for_retry(black_box(attempt)));
            }
        });
    });
}

criterion_group!(
    benches,
    bench_submit_and_await,
    bench_priority_burst,
    bench_breaker_admission,
    bench_backoff_delay
);
criterion_main!(benches);

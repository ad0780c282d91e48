//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use prometheus_gatekeeper::config::SchedulerConfig;
use prometheus_gatekeeper::core::{ErrorKind, InvokeError, Spawn, WorkInvoker};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

// ============================================================================
// SPAWNER
// ============================================================================

/// Spawns onto whatever runtime the test runs in.
#[derive(Clone)]
pub struct TestSpawner;

impl Spawn for TestSpawner {
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(fut);
    }
}

// ============================================================================
// JOBS
// ============================================================================

/// Scripted unit of work.
#[derive(Debug, Clone)]
pub struct Job {
    pub name: String,
    /// How long each attempt takes.
    pub work: Duration,
    /// Number of leading attempts that fail with `kind`.
    pub failures: u32,
    pub kind: ErrorKind,
}

impl Job {
    pub fn ok(name: &str, work_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            work: Duration::from_millis(work_ms),
            failures: 0,
            kind: ErrorKind::Internal,
        }
    }

    pub fn failing(name: &str, failures: u32, kind: ErrorKind) -> Self {
        Self {
            failures,
            kind,
            ..Self::ok(name, 0)
        }
    }
}

// ============================================================================
// INVOKER
// ============================================================================

/// Records what ran, when, and how many attempts overlapped.
#[derive(Default)]
pub struct RecordingInvoker {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    attempts: Mutex<HashMap<String, u32>>,
    started: Mutex<Vec<(String, Instant)>>,
    aborted: Mutex<Vec<String>>,
}

impl RecordingInvoker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Highest number of attempts observed running at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Attempts made for the job called `name`.
    pub fn attempts(&self, name: &str) -> u32 {
        self.attempts.lock().get(name).copied().unwrap_or(0)
    }

    /// Job names in the order their attempts started.
    pub fn start_order(&self) -> Vec<String> {
        self.started.lock().iter().map(|(n, _)| n.clone()).collect()
    }

    /// Start instants of every attempt for `name`.
    pub fn start_times(&self, name: &str) -> Vec<Instant> {
        self.started
            .lock()
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, at)| *at)
            .collect()
    }

    /// Jobs whose attempt observed cancellation.
    pub fn aborted(&self) -> Vec<String> {
        self.aborted.lock().clone()
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl WorkInvoker<Job, String> for RecordingInvoker {
    async fn invoke(
        &self,
        _resource: &str,
        job: Job,
        cancel: CancellationToken,
    ) -> Result<String, InvokeError> {
        let attempt = {
            let mut attempts = self.attempts.lock();
            let n = attempts.entry(job.name.clone()).or_insert(0);
            *n += 1;
            *n
        };
        self.started.lock().push((job.name.clone(), Instant::now()));

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        tokio::select! {
            () = cancel.cancelled() => {
                self.aborted.lock().push(job.name.clone());
                Err(InvokeError::internal("aborted"))
            }
            () = tokio::time::sleep(job.work) => {
                if attempt <= job.failures {
                    Err(InvokeError::new(job.kind, format!("{} attempt {attempt}", job.name)))
                } else {
                    Ok(format!("{}#{attempt}", job.name))
                }
            }
        }
    }
}

// ============================================================================
// CONFIG
// ============================================================================

/// Config with fast retries and a breaker that stays out of the way.
pub fn test_config() -> SchedulerConfig {
    prometheus_gatekeeper::util::init_test_tracing();
    let mut cfg = SchedulerConfig::default();
    cfg.default_resource.max_concurrency = 2;
    cfg.default_resource.queue_capacity = 100;
    cfg.default_timeout_ms = 5_000;
    cfg.shutdown_grace_ms = 1_000;
    cfg.retry.max_attempts = 3;
    cfg.retry.base_delay_ms = 10;
    cfg.retry.max_delay_ms = 100;
    cfg.circuit_breaker.failure_threshold = 100;
    cfg
}

//! Per-resource counters, rolling samples and outcome history.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Samples kept per rolling series.
pub const SAMPLE_WINDOW: usize = 256;

/// Attempt outcomes kept for success-ratio calculations.
pub const OUTCOME_HISTORY: usize = 1024;

/// Mean and max of a rolling series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleSummary {
    /// Samples in the window.
    pub count: usize,
    /// Arithmetic mean.
    pub mean: f64,
    /// Largest sample.
    pub max: f64,
}

#[derive(Debug, Default)]
struct RollingSamples {
    values: VecDeque<f64>,
}

impl RollingSamples {
    fn push(&mut self, value: f64) {
        if self.values.len() >= SAMPLE_WINDOW {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    fn summary(&self) -> SampleSummary {
        if self.values.is_empty() {
            return SampleSummary::default();
        }
        let sum: f64 = self.values.iter().sum();
        #[allow(clippy::cast_precision_loss)]
        let mean = sum / self.values.len() as f64;
        let max = self.values.iter().copied().fold(f64::MIN, f64::max);
        SampleSummary {
            count: self.values.len(),
            mean,
            max,
        }
    }
}

#[derive(Debug, Default)]
struct Samples {
    wait_ms: RollingSamples,
    exec_ms: RollingSamples,
    utilization: RollingSamples,
    outcomes: VecDeque<(Instant, bool)>,
}

/// Point-in-time copy of a resource's metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Tasks accepted by the facade.
    pub submitted: u64,
    /// Tasks resolved successfully.
    pub completed: u64,
    /// Tasks resolved with a terminal error.
    pub failed: u64,
    /// Attempts abandoned on timeout.
    pub timed_out: u64,
    /// Retries scheduled.
    pub retried: u64,
    /// Submissions refused (queue full) plus calls refused by the breaker.
    pub rejected: u64,
    /// Tasks cancelled by their caller.
    pub cancelled: u64,
    /// Time between submission and first dispatch, in milliseconds.
    pub wait_ms: SampleSummary,
    /// Wall-clock time from dispatch to resolution, in milliseconds.
    pub exec_ms: SampleSummary,
    /// In-flight / max concurrency sampled at each dispatch.
    pub utilization: SampleSummary,
}

impl MetricsSnapshot {
    /// Add counters of `other` into `self`. Sample summaries are merged by
    /// weighted mean and max.
    pub fn accumulate(&mut self, other: &Self) {
        self.submitted += other.submitted;
        self.completed += other.completed;
        self.failed += other.failed;
        self.timed_out += other.timed_out;
        self.retried += other.retried;
        self.rejected += other.rejected;
        self.cancelled += other.cancelled;
        merge_summary(&mut self.wait_ms, &other.wait_ms);
        merge_summary(&mut self.exec_ms, &other.exec_ms);
        merge_summary(&mut self.utilization, &other.utilization);
    }
}

#[allow(clippy::cast_precision_loss)]
fn merge_summary(into: &mut SampleSummary, other: &SampleSummary) {
    if other.count == 0 {
        return;
    }
    if into.count == 0 {
        *into = *other;
        return;
    }
    let total = into.count + other.count;
    into.mean = into
        .mean
        .mul_add(into.count as f64, other.mean * other.count as f64)
        / total as f64;
    into.max = into.max.max(other.max);
    into.count = total;
}

/// Metrics owned by one resource.
///
/// Counters are lock-free; rolling samples sit behind a per-resource mutex.
#[derive(Debug, Default)]
pub struct ResourceMetrics {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    retried: AtomicU64,
    rejected: AtomicU64,
    cancelled: AtomicU64,
    queue_depth: AtomicUsize,
    in_flight: AtomicUsize,
    samples: Mutex<Samples>,
}

impl ResourceMetrics {
    pub(crate) fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dispatch(&self, wait: Duration, in_flight: usize, max: usize) {
        #[allow(clippy::cast_precision_loss)]
        let utilization = if max == 0 { 0.0 } else { in_flight as f64 / max as f64 };
        let mut samples = self.samples.lock();
        samples.wait_ms.push(wait.as_secs_f64() * 1000.0);
        samples.utilization.push(utilization);
    }

    pub(crate) fn record_attempt(&self, success: bool) {
        let mut samples = self.samples.lock();
        if samples.outcomes.len() >= OUTCOME_HISTORY {
            samples.outcomes.pop_front();
        }
        samples.outcomes.push_back((Instant::now(), success));
    }

    pub(crate) fn record_resolution(&self, success: bool, exec: Duration) {
        if success {
            self.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.samples.lock().exec_ms.push(exec.as_secs_f64() * 1000.0);
    }

    /// Terminal failure that never reached the executor, e.g. shutdown.
    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_gauges(&self, queue_depth: usize, in_flight: usize) {
        self.queue_depth.store(queue_depth, Ordering::Relaxed);
        self.in_flight.store(in_flight, Ordering::Relaxed);
    }

    /// Waiting tasks as last published by the admission queue.
    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    /// In-flight tasks as last published by the admission queue.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Success ratio and sample count of attempts within `window`.
    pub fn success_ratio(&self, window: Duration) -> (Option<f64>, usize) {
        let now = Instant::now();
        let samples = self.samples.lock();
        let (ok, total) = samples
            .outcomes
            .iter()
            .rev()
            .take_while(|(at, _)| now.saturating_duration_since(*at) <= window)
            .fold((0usize, 0usize), |(ok, total), (_, success)| {
                (ok + usize::from(*success), total + 1)
            });
        #[allow(clippy::cast_precision_loss)]
        let ratio = (total > 0).then(|| ok as f64 / total as f64);
        (ratio, total)
    }

    /// Copy the current counters and summaries.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let samples = self.samples.lock();
        MetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            wait_ms: samples.wait_ms.summary(),
            exec_ms: samples.exec_ms.summary(),
            utilization: samples.utilization.summary(),
        }
    }
}

/// Metrics for every resource a scheduler has seen.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    resources: RwLock<HashMap<Arc<str>, Arc<ResourceMetrics>>>,
}

impl MetricsRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Metrics for `name`, created on first reference.
    pub fn get(&self, name: &str) -> Arc<ResourceMetrics> {
        if let Some(metrics) = self.resources.read().get(name) {
            return Arc::clone(metrics);
        }
        Arc::clone(
            self.resources
                .write()
                .entry(Arc::from(name))
                .or_default(),
        )
    }

    /// Metrics for `name` if the resource has been seen.
    pub fn lookup(&self, name: &str) -> Option<Arc<ResourceMetrics>> {
        self.resources.read().get(name).cloned()
    }

    /// All known resources and their metrics.
    pub fn entries(&self) -> Vec<(Arc<str>, Arc<ResourceMetrics>)> {
        self.resources
            .read()
            .iter()
            .map(|(name, metrics)| (Arc::clone(name), Arc::clone(metrics)))
            .collect()
    }

    /// Sum of every resource's snapshot.
    pub fn totals(&self) -> MetricsSnapshot {
        let mut totals = MetricsSnapshot::default();
        for (_, metrics) in self.entries() {
            totals.accumulate(&metrics.snapshot());
        }
        totals
    }
}

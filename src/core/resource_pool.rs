//! Per-resource admission queue.
//!
//! A [`ResourcePool`] turns unbounded submission into bounded, ordered
//! execution for one named resource: tasks wait in a priority queue and are
//! released to the [`RetryExecutor`] whenever the in-flight count is below
//! the resource's concurrency limit. Each completion immediately triggers
//! another dispatch, so capacity never idles while work is pending.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::completion::Completer;
use super::{ResourceMetrics, RetryExecutor, ScheduledTask, SchedulerError, TaskId, WorkInvoker};
use crate::config::ResourceConfig;
use crate::infra::queue::InMemoryQueue;

/// Abstraction for spawning task execution on a runtime.
pub trait Spawn {
    /// Spawn a detached future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Capacity limits of one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolLimits {
    /// Maximum concurrent in-flight tasks.
    pub max_concurrency: usize,
    /// Maximum waiting tasks.
    pub queue_capacity: usize,
}

impl From<ResourceConfig> for PoolLimits {
    fn from(cfg: ResourceConfig) -> Self {
        Self {
            max_concurrency: cfg.max_concurrency,
            queue_capacity: cfg.queue_capacity,
        }
    }
}

/// Point-in-time view of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    /// Waiting tasks.
    pub queue_depth: usize,
    /// Running tasks.
    pub in_flight: usize,
    /// Current limits.
    pub limits: PoolLimits,
    /// Whether new submissions are accepted.
    pub accepting: bool,
}

struct InFlight<T> {
    completer: Arc<Completer<T>>,
    cancel: CancellationToken,
}

struct PoolState<P, T> {
    limits: PoolLimits,
    queue: InMemoryQueue<P, T>,
    in_flight: usize,
    running: HashMap<TaskId, InFlight<T>>,
    accepting: bool,
}

/// Admission-controlled queue and concurrency counter for one resource.
///
/// The queue, the in-flight counter and the running set live behind a single
/// per-resource mutex; pools never share a lock.
pub struct ResourcePool<P, T, I, S> {
    name: Arc<str>,
    state: Mutex<PoolState<P, T>>,
    executor: Arc<RetryExecutor<P, T, I>>,
    metrics: Arc<ResourceMetrics>,
    spawner: S,
    idle: Notify,
}

impl<P, T, I, S> fmt::Debug for ResourcePool<P, T, I, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ResourcePool")
            .field("name", &self.name)
            .field("limits", &state.limits)
            .field("queue_depth", &state.queue.len())
            .field("in_flight", &state.in_flight)
            .finish_non_exhaustive()
    }
}

impl<P, T, I, S> ResourcePool<P, T, I, S>
where
    P: Clone + Send + Sync + 'static,
    T: Send + 'static,
    I: WorkInvoker<P, T>,
    S: Spawn + Send + Sync + 'static,
{
    /// Create a pool from components.
    pub fn new(
        name: Arc<str>,
        limits: PoolLimits,
        executor: Arc<RetryExecutor<P, T, I>>,
        metrics: Arc<ResourceMetrics>,
        spawner: S,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            state: Mutex::new(PoolState {
                limits,
                queue: InMemoryQueue::new(limits.queue_capacity),
                in_flight: 0,
                running: HashMap::new(),
                accepting: true,
            }),
            executor,
            metrics,
            spawner,
            idle: Notify::new(),
        })
    }

    /// Resource name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current limits.
    pub fn limits(&self) -> PoolLimits {
        self.state.lock().limits
    }

    /// Metrics owned by this pool.
    pub const fn metrics(&self) -> &Arc<ResourceMetrics> {
        &self.metrics
    }

    /// Replace the limits. Running tasks are left alone; if the concurrency
    /// limit shrank, dispatch pauses until in-flight drops below it.
    pub fn update_limits(self: &Arc<Self>, limits: PoolLimits) {
        {
            let mut state = self.state.lock();
            if state.limits == limits {
                return;
            }
            info!(
                resource = %self.name,
                max_concurrency = limits.max_concurrency,
                queue_capacity = limits.queue_capacity,
                "updating resource limits"
            );
            state.limits = limits;
            state.queue.set_max_depth(limits.queue_capacity);
        }
        self.dispatch();
    }

    /// Queue a task and try to dispatch.
    ///
    /// Never blocks: the task is either queued, started or rejected before
    /// this returns.
    pub fn submit(self: &Arc<Self>, task: ScheduledTask<P, T>) -> Result<(), SchedulerError> {
        let cancelled = {
            let mut state = self.state.lock();
            if !state.accepting {
                return Err(SchedulerError::ShuttingDown);
            }
            let cancelled = state.queue.remove_cancelled();
            let task_id = task.meta.id;
            if let Err(e) = state.queue.enqueue(task) {
                warn!(
                    resource = %self.name,
                    task_id = %task_id,
                    depth = state.queue.len(),
                    "task rejected: queue full"
                );
                self.metrics.record_rejected();
                drop(state);
                self.resolve_cancelled(cancelled);
                return Err(e);
            }
            debug!(resource = %self.name, task_id = %task_id, depth = state.queue.len(), "task queued");
            self.publish_gauges(&state);
            cancelled
        };
        self.resolve_cancelled(cancelled);
        self.dispatch();
        Ok(())
    }

    /// Start queued tasks while capacity allows.
    fn dispatch(self: &Arc<Self>) {
        loop {
            let (task, in_flight, max) = {
                let mut state = self.state.lock();
                if state.in_flight >= state.limits.max_concurrency {
                    break;
                }
                let Some(task) = state.queue.dequeue() else {
                    break;
                };
                if task.cancel.is_cancelled() {
                    drop(state);
                    self.resolve_cancelled(vec![task]);
                    continue;
                }
                state.in_flight += 1;
                state.running.insert(
                    task.meta.id,
                    InFlight {
                        completer: Arc::clone(&task.completer),
                        cancel: task.cancel.clone(),
                    },
                );
                self.publish_gauges(&state);
                (task, state.in_flight, state.limits.max_concurrency)
            };

            self.metrics
                .record_dispatch(task.meta.enqueued_at.elapsed(), in_flight, max);
            debug!(
                resource = %self.name,
                task_id = %task.meta.id,
                in_flight,
                max_concurrency = max,
                "dispatching task"
            );
            self.spawn_task(task);
        }
    }

    fn spawn_task(self: &Arc<Self>, task: ScheduledTask<P, T>) {
        let guard = SlotGuard {
            pool: Arc::clone(self),
            task_id: task.meta.id,
        };
        self.spawner.spawn(async move {
            let ScheduledTask {
                mut meta,
                payload,
                completer,
                cancel,
            } = task;
            let pool = &guard.pool;
            let started = Instant::now();

            let outcome = pool
                .executor
                .execute(&mut meta, payload, &cancel, &pool.metrics)
                .await;

            let success = outcome.is_ok();
            let cancelled = matches!(outcome, Err(SchedulerError::Cancelled));
            if let Err(e) = &outcome {
                debug!(resource = %pool.name, task_id = %meta.id, attempts = meta.attempts, error = %e, "task failed");
            } else {
                debug!(resource = %pool.name, task_id = %meta.id, attempts = meta.attempts, "task completed");
            }
            // Forced shutdown may have resolved the task already.
            if completer.resolve(outcome) {
                if cancelled {
                    pool.metrics.record_cancelled();
                } else {
                    pool.metrics.record_resolution(success, started.elapsed());
                }
            }
            drop(guard);
        });
    }

    /// Release the slot held by `task_id` and refill capacity.
    fn on_task_finished(self: &Arc<Self>, task_id: TaskId) {
        {
            let mut state = self.state.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
            state.running.remove(&task_id);
            self.publish_gauges(&state);
            if state.in_flight == 0 {
                self.idle.notify_waiters();
            }
        }
        self.dispatch();
    }

    fn resolve_cancelled(&self, tasks: Vec<ScheduledTask<P, T>>) {
        for task in tasks {
            if task.completer.resolve(Err(SchedulerError::Cancelled)) {
                self.metrics.record_cancelled();
                debug!(resource = %self.name, task_id = %task.meta.id, "queued task cancelled");
            }
        }
    }

    fn publish_gauges(&self, state: &PoolState<P, T>) {
        self.metrics.set_gauges(state.queue.len(), state.in_flight);
    }

    /// Current queue depth, in-flight count and limits.
    pub fn snapshot(&self) -> PoolSnapshot {
        let state = self.state.lock();
        PoolSnapshot {
            queue_depth: state.queue.len(),
            in_flight: state.in_flight,
            limits: state.limits,
            accepting: state.accepting,
        }
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.state.lock().in_flight == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stop accepting work and reject everything still queued with
    /// `ShuttingDown`. Running tasks are untouched.
    pub fn close(&self) {
        let drained = {
            let mut state = self.state.lock();
            state.accepting = false;
            let drained = state.queue.drain();
            self.publish_gauges(&state);
            drained
        };

        if !drained.is_empty() {
            info!(resource = %self.name, count = drained.len(), "rejecting queued tasks at shutdown");
        }
        for task in drained {
            if task.completer.resolve(Err(SchedulerError::ShuttingDown)) {
                self.metrics.record_failed();
            }
        }
    }

    /// Wait until no task is running or `deadline` passes; anything still
    /// running then is cancelled and resolved with `ShutdownForced`.
    pub async fn drain_until(&self, deadline: Instant) {
        if tokio::time::timeout_at(deadline, self.wait_idle()).await.is_ok() {
            return;
        }

        let running: Vec<(TaskId, Arc<Completer<T>>, CancellationToken)> = self
            .state
            .lock()
            .running
            .iter()
            .map(|(id, f)| (*id, Arc::clone(&f.completer), f.cancel.clone()))
            .collect();
        warn!(
            resource = %self.name,
            count = running.len(),
            "grace period elapsed, forcing in-flight tasks"
        );
        for (task_id, completer, cancel) in running {
            cancel.cancel();
            if completer.resolve(Err(SchedulerError::ShutdownForced)) {
                self.metrics.record_failed();
                debug!(resource = %self.name, task_id = %task_id, "task forcibly resolved");
            }
        }
    }

    /// [`close`](Self::close) then [`drain_until`](Self::drain_until) with a
    /// deadline `grace` from now.
    ///
    /// Safe to call repeatedly; each task is resolved at most once.
    pub async fn shutdown(&self, grace: Duration) {
        self.close();
        self.drain_until(Instant::now() + grace).await;
    }
}

/// Holds one concurrency slot; dropping it (normally or on panic unwind)
/// releases the slot and triggers the next dispatch.
struct SlotGuard<P, T, I, S>
where
    P: Clone + Send + Sync + 'static,
    T: Send + 'static,
    I: WorkInvoker<P, T>,
    S: Spawn + Send + Sync + 'static,
{
    pool: Arc<ResourcePool<P, T, I, S>>,
    task_id: TaskId,
}

impl<P, T, I, S> Drop for SlotGuard<P, T, I, S>
where
    P: Clone + Send + Sync + 'static,
    T: Send + 'static,
    I: WorkInvoker<P, T>,
    S: Spawn + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.pool.on_task_finished(self.task_id);
    }
}

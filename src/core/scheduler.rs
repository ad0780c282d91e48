//! Scheduler facade: the single entry point callers use.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::completion::{completion_pair, CompletionHandle};
use super::health::{HealthEvent, HealthMonitor, HealthReport, HealthStatus};
use super::{
    CircuitBreakerRegistry, CircuitEvent, CircuitState, MetricsRegistry, MetricsSnapshot,
    PoolLimits, ResourcePool, RetryExecutor, RetryPolicy, ScheduledTask, SchedulerError, Spawn,
    SubmitOptions, TaskMetadata, WorkInvoker,
};
use crate::config::{ResourceConfig, SchedulerConfig};

/// Per-resource part of a status snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceStatus {
    /// Waiting tasks.
    pub queue_depth: usize,
    /// Running tasks.
    pub in_flight: usize,
    /// Concurrency limit.
    pub max_concurrency: usize,
    /// Queue capacity.
    pub queue_capacity: usize,
    /// Breaker state.
    pub circuit_state: CircuitState,
    /// Attempt success ratio over the health window, if any attempts ran.
    pub success_rate: Option<f64>,
    /// Counters and rolling summaries.
    pub metrics: MetricsSnapshot,
}

/// System-wide part of a status snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateStatus {
    /// Worst-of health across resources.
    pub health: HealthStatus,
    /// Sum of every resource's metrics.
    pub totals: MetricsSnapshot,
}

/// Answer of [`Scheduler::get_status`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Keyed by resource name.
    pub resources: BTreeMap<String, ResourceStatus>,
    /// Aggregate view.
    pub aggregate: AggregateStatus,
}

/// Routes submissions to per-resource admission queues and owns the shared
/// breaker registry, metrics and health monitor.
pub struct Scheduler<P, T, I, S> {
    config: SchedulerConfig,
    pools: RwLock<HashMap<Arc<str>, Arc<ResourcePool<P, T, I, S>>>>,
    executor: Arc<RetryExecutor<P, T, I>>,
    breakers: Arc<CircuitBreakerRegistry>,
    metrics: Arc<MetricsRegistry>,
    health: Arc<HealthMonitor>,
    spawner: S,
    accepting: AtomicBool,
    stop: CancellationToken,
}

impl<P, T, I, S> fmt::Debug for Scheduler<P, T, I, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("resources", &self.pools.read().len())
            .field("accepting", &self.accepting.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<P, T, I, S> Scheduler<P, T, I, S>
where
    P: Clone + Send + Sync + 'static,
    T: Send + 'static,
    I: WorkInvoker<P, T>,
    S: Spawn + Clone + Send + Sync + 'static,
{
    /// Create a scheduler with a retry policy and breakers built from
    /// `config`, registering every resource listed in it.
    pub fn new(config: SchedulerConfig, invoker: Arc<I>, spawner: S) -> Result<Self, SchedulerError> {
        let breakers = Arc::new(CircuitBreakerRegistry::new(config.circuit_breaker.clone()));
        let executor = RetryExecutor::new(invoker, breakers, RetryPolicy::from(&config.retry));
        Self::with_executor(config, executor, spawner)
    }

    /// Create a scheduler around a prepared executor.
    ///
    /// The breaker registry is taken from the executor so the facade and the
    /// retry loop always observe the same breakers.
    pub fn with_executor(
        config: SchedulerConfig,
        executor: RetryExecutor<P, T, I>,
        spawner: S,
    ) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;

        let breakers = Arc::clone(executor.breakers());
        let metrics = Arc::new(MetricsRegistry::new());
        let health = Arc::new(HealthMonitor::new(
            config.health.clone(),
            Arc::clone(&breakers),
            Arc::clone(&metrics),
        ));

        let scheduler = Self {
            pools: RwLock::new(HashMap::new()),
            executor: Arc::new(executor),
            breakers,
            metrics,
            health,
            spawner,
            accepting: AtomicBool::new(true),
            stop: CancellationToken::new(),
            config,
        };

        let mut configured: Vec<_> = scheduler.config.resources.iter().collect();
        configured.sort_by(|a, b| a.0.cmp(b.0));
        for (name, limits) in configured {
            scheduler.insert_pool(name, PoolLimits::from(*limits))?;
        }
        info!(
            resources = scheduler.pools.read().len(),
            auto_register = scheduler.config.auto_register,
            "scheduler initialized"
        );
        Ok(scheduler)
    }

    /// Active configuration.
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Breaker registry shared with the retry executor.
    pub const fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    /// Metrics of every resource.
    pub const fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Health monitor reading this scheduler's state.
    pub const fn health_monitor(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    /// Register a resource, or update its limits if it already exists.
    ///
    /// Lowering the concurrency limit never preempts running tasks.
    pub fn register_resource(
        &self,
        name: &str,
        max_concurrency: usize,
        queue_capacity: usize,
    ) -> Result<(), SchedulerError> {
        if name.is_empty() {
            return Err(SchedulerError::InvalidConfig("resource name must not be empty".into()));
        }
        let config = ResourceConfig::new(max_concurrency, queue_capacity);
        config.validate().map_err(SchedulerError::InvalidConfig)?;
        if !self.accepting.load(Ordering::Acquire) {
            return Err(SchedulerError::ShuttingDown);
        }

        let existing = self.pools.read().get(name).cloned();
        match existing {
            Some(pool) => pool.update_limits(PoolLimits::from(config)),
            None => {
                self.insert_pool(name, PoolLimits::from(config))?;
            }
        }
        Ok(())
    }

    /// Create the pool for `name` unless it exists.
    ///
    /// `accepting` is re-read under the pools write lock, the same lock
    /// [`shutdown`](Self::shutdown) holds while flipping it, so no pool can
    /// appear after shutdown has taken its list of pools to drain.
    fn insert_pool(
        &self,
        name: &str,
        limits: PoolLimits,
    ) -> Result<Arc<ResourcePool<P, T, I, S>>, SchedulerError> {
        let mut pools = self.pools.write();
        if !self.accepting.load(Ordering::Acquire) {
            return Err(SchedulerError::ShuttingDown);
        }
        let pool = pools.entry(Arc::from(name)).or_insert_with_key(|key| {
            info!(
                resource = %key,
                max_concurrency = limits.max_concurrency,
                queue_capacity = limits.queue_capacity,
                "registering resource"
            );
            ResourcePool::new(
                Arc::clone(key),
                limits,
                Arc::clone(&self.executor),
                self.metrics.get(key),
                self.spawner.clone(),
            )
        });
        Ok(Arc::clone(pool))
    }

    fn pool_for(&self, resource: &str) -> Result<Arc<ResourcePool<P, T, I, S>>, SchedulerError> {
        if let Some(pool) = self.pools.read().get(resource) {
            return Ok(Arc::clone(pool));
        }
        if !self.config.auto_register || resource.is_empty() {
            return Err(SchedulerError::UnknownResource(resource.to_string()));
        }
        self.insert_pool(resource, PoolLimits::from(self.config.default_resource))
    }

    /// Submit `payload` for execution against `resource`.
    ///
    /// Returns immediately. Rejections (`QueueFull`, `UnknownResource`,
    /// `ShuttingDown`) are returned here; everything else arrives through
    /// the handle.
    pub fn submit(
        &self,
        resource: &str,
        payload: P,
        options: SubmitOptions,
    ) -> Result<CompletionHandle<T>, SchedulerError> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(SchedulerError::ShuttingDown);
        }
        let pool = self.pool_for(resource)?;

        let mut meta = TaskMetadata::new(
            pool.name(),
            options.timeout.unwrap_or_else(|| self.config.default_timeout()),
        );
        meta.priority = options.priority;
        meta.max_attempts = options.max_attempts;

        let cancel = CancellationToken::new();
        let (completer, handle) = completion_pair(meta.id, cancel.clone());
        let task_id = meta.id;
        pool.submit(ScheduledTask {
            meta,
            payload,
            completer: Arc::new(completer),
            cancel,
        })?;
        pool.metrics().record_submitted();
        debug!(resource, task_id = %task_id, priority = ?options.priority, "task submitted");
        Ok(handle)
    }

    /// Names of registered resources, sorted.
    pub fn resources(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pools.read().keys().map(|k| k.to_string()).collect();
        names.sort();
        names
    }

    /// Queue depth, in-flight count, breaker state and success ratio per
    /// resource, plus aggregate health and totals.
    pub fn get_status(&self) -> StatusSnapshot {
        let pools: Vec<_> = self
            .pools
            .read()
            .iter()
            .map(|(name, pool)| (Arc::clone(name), Arc::clone(pool)))
            .collect();
        let window = self.config.health.window();

        let resources = pools
            .into_iter()
            .map(|(name, pool)| {
                let snapshot = pool.snapshot();
                let (success_rate, _) = pool.metrics().success_ratio(window);
                let status = ResourceStatus {
                    queue_depth: snapshot.queue_depth,
                    in_flight: snapshot.in_flight,
                    max_concurrency: snapshot.limits.max_concurrency,
                    queue_capacity: snapshot.limits.queue_capacity,
                    circuit_state: self.breakers.state(&name),
                    success_rate,
                    metrics: pool.metrics().snapshot(),
                };
                (name.to_string(), status)
            })
            .collect();

        StatusSnapshot {
            resources,
            aggregate: AggregateStatus {
                health: self.health.report().status,
                totals: self.metrics.totals(),
            },
        }
    }

    /// Assess health now, publishing a change event if the status moved.
    pub fn health(&self) -> HealthReport {
        self.health.evaluate()
    }

    /// Subscribe to aggregate health changes.
    pub fn subscribe_health(&self) -> broadcast::Receiver<HealthEvent> {
        self.health.subscribe()
    }

    /// Subscribe to circuit breaker transitions.
    pub fn subscribe_circuit(&self) -> broadcast::Receiver<CircuitEvent> {
        self.breakers.subscribe()
    }

    /// Run the health monitor on the scheduler's spawner until shutdown.
    pub fn spawn_health_monitor(&self) {
        let monitor = Arc::clone(&self.health);
        let stop = self.stop.child_token();
        self.spawner.spawn(monitor.run(stop));
    }

    /// Whether new submissions are accepted.
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Stop accepting work, reject queued tasks with `ShuttingDown`, wait up
    /// to `grace` for running tasks and force the rest with `ShutdownForced`.
    ///
    /// Idempotent: later calls find nothing left to resolve.
    pub async fn shutdown(&self, grace: Duration) {
        let (first, pools) = {
            let guard = self.pools.write();
            let first = self.accepting.swap(false, Ordering::AcqRel);
            let pools: Vec<_> = guard.values().cloned().collect();
            (first, pools)
        };
        if first {
            info!(grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX), "scheduler shutting down");
        } else {
            debug!("shutdown already requested");
        }
        self.stop.cancel();

        for pool in &pools {
            pool.close();
        }
        let deadline = Instant::now() + grace;
        for pool in &pools {
            pool.drain_until(deadline).await;
        }

        let forced = pools.iter().any(|pool| pool.snapshot().in_flight > 0);
        if forced {
            warn!("scheduler stopped with tasks still unwinding");
        } else {
            info!("scheduler stopped");
        }
    }

    /// [`shutdown`](Self::shutdown) with the configured grace period.
    pub async fn shutdown_default(&self) {
        self.shutdown(self.config.shutdown_grace()).await;
    }
}

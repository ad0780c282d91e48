//! Fluent construction of a [`Scheduler`] from configuration and
//! collaborators.

use std::sync::Arc;

use crate::config::{ResourceConfig, SchedulerConfig};
use crate::core::{
    CircuitBreakerRegistry, FallbackHandler, RetryExecutor, RetryPolicy, Scheduler,
    SchedulerError, Spawn, WorkInvoker,
};

/// Builder for [`Scheduler`].
///
/// ```rust,ignore
/// let scheduler = SchedulerBuilder::new(Arc::new(MyInvoker))
///     .config(SchedulerConfig::from_env()?)
///     .resource("payments", 4, 100)
///     .fallback(Arc::new(CachedReply))
///     .build(TokioSpawner::current())?;
/// ```
pub struct SchedulerBuilder<P, T, I> {
    config: SchedulerConfig,
    invoker: Arc<I>,
    fallback: Option<Arc<dyn FallbackHandler<P, T>>>,
}

impl<P, T, I> SchedulerBuilder<P, T, I>
where
    P: Clone + Send + Sync + 'static,
    T: Send + 'static,
    I: WorkInvoker<P, T>,
{
    /// Start from default configuration.
    pub fn new(invoker: Arc<I>) -> Self {
        Self {
            config: SchedulerConfig::default(),
            invoker,
            fallback: None,
        }
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Add or replace one resource registered at build time.
    #[must_use]
    pub fn resource(mut self, name: impl Into<String>, max_concurrency: usize, queue_capacity: usize) -> Self {
        self.config
            .resources
            .insert(name.into(), ResourceConfig::new(max_concurrency, queue_capacity));
        self
    }

    /// Whether unknown resource names are registered on first submission.
    #[must_use]
    pub const fn auto_register(mut self, enabled: bool) -> Self {
        self.config.auto_register = enabled;
        self
    }

    /// Degraded path for submissions refused by an open breaker.
    #[must_use]
    pub fn fallback(mut self, fallback: Arc<dyn FallbackHandler<P, T>>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Validate the configuration and build the scheduler.
    pub fn build<S>(self, spawner: S) -> Result<Scheduler<P, T, I, S>, SchedulerError>
    where
        S: Spawn + Clone + Send + Sync + 'static,
    {
        let breakers = Arc::new(CircuitBreakerRegistry::new(
            self.config.circuit_breaker.clone(),
        ));
        let mut executor = RetryExecutor::new(
            self.invoker,
            breakers,
            RetryPolicy::from(&self.config.retry),
        );
        if let Some(fallback) = self.fallback {
            executor = executor.with_fallback(fallback);
        }
        Scheduler::with_executor(self.config, executor, spawner)
    }
}

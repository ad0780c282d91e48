//! Retry executor: timeout, cancellation and exponential backoff around one
//! task's unit of work.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::completion::TaskOutcome;
use super::{
    CircuitBreakerRegistry, FallbackHandler, ResourceMetrics, SchedulerError, TaskMetadata,
    WorkInvoker,
};
use crate::config::RetryConfig;

/// Attempt budget and backoff curve.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Growth factor per failed attempt.
    pub multiplier: f64,
    /// Cap on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            base_delay: Duration::from_millis(cfg.base_delay_ms),
            multiplier: cfg.backoff_multiplier.max(1.0),
            max_delay: Duration::from_millis(cfg.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay after the `failed_attempt`-th failure (1-based):
    /// `base_delay × multiplier^(failed_attempt-1)`, capped at `max_delay`.
    #[must_use]
    pub fn delay_for_retry(&self, failed_attempt: u32) -> Duration {
        let exponent = i32::try_from(failed_attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let raw = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = raw.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max_delay
        }
    }
}

/// Runs one task's work with bounded attempts, a per-attempt timeout and
/// backoff, consulting the resource's circuit breaker before every attempt.
///
/// Retries happen inside the executor, so a task that has started never
/// goes back behind other waiting work.
pub struct RetryExecutor<P, T, I> {
    invoker: Arc<I>,
    fallback: Option<Arc<dyn FallbackHandler<P, T>>>,
    breakers: Arc<CircuitBreakerRegistry>,
    policy: RetryPolicy,
    _marker: PhantomData<fn(P) -> T>,
}

impl<P, T, I> RetryExecutor<P, T, I>
where
    P: Clone + Send + Sync + 'static,
    T: Send + 'static,
    I: WorkInvoker<P, T>,
{
    /// Create an executor around `invoker`.
    pub fn new(invoker: Arc<I>, breakers: Arc<CircuitBreakerRegistry>, policy: RetryPolicy) -> Self {
        Self {
            invoker,
            fallback: None,
            breakers,
            policy,
            _marker: PhantomData,
        }
    }

    /// Use `fallback` instead of failing with `CircuitOpen`.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackHandler<P, T>>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Retry policy in force.
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Breaker registry consulted before each attempt.
    pub const fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    /// Execute the task until success, a permanent failure, budget
    /// exhaustion, a breaker refusal or cancellation.
    ///
    /// Every attempt that reaches the collaborator reports exactly one
    /// outcome to the breaker; refusals and cancellations report none.
    /// Cancellation is counted by whoever resolves the task, not here.
    pub async fn execute(
        &self,
        meta: &mut TaskMetadata,
        payload: P,
        cancel: &CancellationToken,
        metrics: &ResourceMetrics,
    ) -> TaskOutcome<T> {
        let max_attempts = meta.max_attempts.unwrap_or(self.policy.max_attempts).max(1);
        let breaker = self.breakers.get(&meta.resource);

        loop {
            if cancel.is_cancelled() {
                return Err(SchedulerError::Cancelled);
            }

            let Some(permit) = breaker.try_acquire() else {
                metrics.record_rejected();
                return self.degrade(meta, payload).await;
            };

            meta.attempts += 1;
            let attempt = meta.attempts;
            let attempt_token = cancel.child_token();

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    attempt_token.cancel();
                    breaker.release_trial(permit);
                    debug!(task_id = %meta.id, resource = %meta.resource, attempt, "attempt cancelled");
                    return Err(SchedulerError::Cancelled);
                }
                res = tokio::time::timeout(
                    meta.timeout,
                    self.invoker.invoke(&meta.resource, payload.clone(), attempt_token.clone()),
                ) => res,
            };

            let err = match result {
                Ok(Ok(value)) => {
                    breaker.record_outcome(permit, true);
                    metrics.record_attempt(true);
                    if attempt > 1 {
                        info!(task_id = %meta.id, resource = %meta.resource, attempt, "task recovered after retry");
                    }
                    return Ok(value);
                }
                Ok(Err(e)) => SchedulerError::from_invoke(e),
                Err(_) => {
                    attempt_token.cancel();
                    metrics.record_timeout();
                    SchedulerError::Timeout(meta.timeout)
                }
            };

            breaker.record_outcome(permit, false);
            metrics.record_attempt(false);

            if !err.is_transient() {
                debug!(task_id = %meta.id, resource = %meta.resource, error = %err, "permanent failure");
                return Err(err);
            }

            if attempt >= max_attempts {
                debug!(task_id = %meta.id, resource = %meta.resource, attempts = attempt, "retry budget exhausted");
                return Err(if max_attempts == 1 {
                    err
                } else {
                    SchedulerError::RetryBudgetExhausted {
                        attempts: attempt,
                        last: Box::new(err),
                    }
                });
            }

            let delay = self.policy.delay_for_retry(attempt);
            metrics.record_retry();
            debug!(
                task_id = %meta.id,
                resource = %meta.resource,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "retrying after transient failure"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(SchedulerError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn degrade(&self, meta: &TaskMetadata, payload: P) -> TaskOutcome<T> {
        match &self.fallback {
            Some(fallback) => {
                debug!(task_id = %meta.id, resource = %meta.resource, "circuit open, using fallback");
                fallback
                    .fallback(&meta.resource, payload)
                    .await
                    .map_err(SchedulerError::from_invoke)
            }
            None => Err(SchedulerError::CircuitOpen(meta.resource.to_string())),
        }
    }
}

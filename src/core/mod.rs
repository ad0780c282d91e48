//! Core scheduling: admission queues, retries, circuit breakers, health.

pub mod circuit_breaker;
pub mod completion;
pub mod error;
pub mod executor;
pub mod health;
pub mod metrics;
pub mod resource_pool;
pub mod retry;
pub mod scheduler;
pub mod task;

pub use circuit_breaker::{
    BreakerPermit, CircuitBreaker, CircuitBreakerRegistry, CircuitEvent, CircuitState,
};
pub use completion::{CompletionHandle, TaskOutcome};
pub use error::{AppResult, ErrorKind, InvokeError, SchedulerError};
pub use executor::{FallbackHandler, WorkInvoker};
pub use health::{HealthEvent, HealthMonitor, HealthReport, HealthStatus, ResourceHealth};
pub use metrics::{MetricsRegistry, MetricsSnapshot, ResourceMetrics, SampleSummary};
pub use resource_pool::{PoolLimits, PoolSnapshot, ResourcePool, Spawn};
pub use retry::{RetryExecutor, RetryPolicy};
pub use scheduler::{AggregateStatus, ResourceStatus, Scheduler, StatusSnapshot};
pub use task::{Priority, ScheduledTask, SubmitOptions, TaskId, TaskMetadata};

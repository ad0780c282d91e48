//! Configuration models for resources, retries, breakers and health checks.

/// Resource limits and root scheduler configuration.
pub mod pool;
/// Retry, circuit breaker and health monitor settings.
pub mod resilience;

pub use pool::{ResourceConfig, SchedulerConfig, ENV_PREFIX};
pub use resilience::{CircuitBreakerConfig, HealthConfig, RetryConfig};

//! Retry, circuit breaker and health monitor settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential backoff settings for the retry executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per task, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Factor applied to the delay after each failed attempt.
    pub backoff_multiplier: f64,
    /// Upper bound on any single delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            backoff_multiplier: 2.0,
            max_delay_ms: 10_000,
        }
    }
}

impl RetryConfig {
    /// Validate retry settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be greater than 0".into());
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err("backoff_multiplier must be a finite value >= 1.0".into());
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err("max_delay_ms must be >= base_delay_ms".into());
        }
        Ok(())
    }
}

/// Circuit breaker thresholds, shared by every breaker in a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open a closed breaker.
    pub failure_threshold: u32,
    /// Successes in half-open that close the breaker.
    pub success_threshold: u32,
    /// How long an open breaker refuses calls, in milliseconds.
    pub open_duration_ms: u64,
    /// Concurrent trial calls admitted while half-open.
    pub half_open_max_trials: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_duration_ms: 30_000,
            half_open_max_trials: 1,
        }
    }
}

impl CircuitBreakerConfig {
    /// Open duration as a `Duration`.
    #[must_use]
    pub const fn open_duration(&self) -> Duration {
        Duration::from_millis(self.open_duration_ms)
    }

    /// Validate breaker settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".into());
        }
        if self.success_threshold == 0 {
            return Err("success_threshold must be greater than 0".into());
        }
        if self.half_open_max_trials == 0 {
            return Err("half_open_max_trials must be greater than 0".into());
        }
        Ok(())
    }
}

/// Health monitor cadence and classification thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Evaluation interval, in milliseconds.
    pub interval_ms: u64,
    /// Trailing window for success ratios, in milliseconds.
    pub window_ms: u64,
    /// Outcomes required in the window before a ratio is trusted.
    pub min_samples: usize,
    /// Ratio above which a resource is healthy; exactly this ratio is degraded.
    pub healthy_threshold: f64,
    /// Ratio below which a resource is critical; exactly this ratio is degraded.
    pub critical_threshold: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_ms: 10_000,
            window_ms: 60_000,
            min_samples: 10,
            healthy_threshold: 0.9,
            critical_threshold: 0.5,
        }
    }
}

impl HealthConfig {
    /// Evaluation interval as a `Duration`.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Trailing window as a `Duration`.
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Validate monitor settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.interval_ms == 0 {
            return Err("interval_ms must be greater than 0".into());
        }
        if self.window_ms == 0 {
            return Err("window_ms must be greater than 0".into());
        }
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if !in_unit(self.healthy_threshold) || !in_unit(self.critical_threshold) {
            return Err("health thresholds must be within [0, 1]".into());
        }
        if self.critical_threshold > self.healthy_threshold {
            return Err("critical_threshold must not exceed healthy_threshold".into());
        }
        Ok(())
    }
}

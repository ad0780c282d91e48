//! Resource and scheduler configuration structures.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::{CircuitBreakerConfig, HealthConfig, RetryConfig};
use crate::core::AppResult;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "GATEKEEPER_";

/// Limits for one named resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Maximum concurrent in-flight tasks.
    pub max_concurrency: usize,
    /// Maximum waiting tasks before `QueueFull`.
    pub queue_capacity: usize,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            max_concurrency: num_cpus::get(),
            queue_capacity: 1024,
        }
    }
}

impl ResourceConfig {
    /// Build limits explicitly.
    #[must_use]
    pub const fn new(max_concurrency: usize, queue_capacity: usize) -> Self {
        Self {
            max_concurrency,
            queue_capacity,
        }
    }

    /// Validate resource limits.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrency == 0 {
            return Err("max_concurrency must be greater than 0".into());
        }
        if self.queue_capacity == 0 {
            return Err("queue_capacity must be greater than 0".into());
        }
        Ok(())
    }
}

/// Root scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Limits applied to auto-registered resources.
    pub default_resource: ResourceConfig,
    /// Resources registered up front, keyed by name.
    pub resources: HashMap<String, ResourceConfig>,
    /// Register unknown resource names on first submission.
    pub auto_register: bool,
    /// Per-attempt timeout when a submission does not set one, in milliseconds.
    pub default_timeout_ms: u64,
    /// Grace period used by `shutdown_default`, in milliseconds.
    pub shutdown_grace_ms: u64,
    /// Retry/backoff settings.
    pub retry: RetryConfig,
    /// Circuit breaker thresholds.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Health monitor settings.
    pub health: HealthConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_resource: ResourceConfig::default(),
            resources: HashMap::new(),
            auto_register: true,
            default_timeout_ms: 30_000,
            shutdown_grace_ms: 5_000,
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            health: HealthConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Default per-attempt timeout as a `Duration`.
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Shutdown grace period as a `Duration`.
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.default_resource
            .validate()
            .map_err(|e| format!("default_resource invalid: {e}"))?;
        for (name, resource) in &self.resources {
            if name.is_empty() {
                return Err("resource names must not be empty".into());
            }
            resource
                .validate()
                .map_err(|e| format!("resource `{name}` invalid: {e}"))?;
        }
        if self.default_timeout_ms == 0 {
            return Err("default_timeout_ms must be greater than 0".into());
        }
        self.retry.validate().map_err(|e| format!("retry invalid: {e}"))?;
        self.circuit_breaker
            .validate()
            .map_err(|e| format!("circuit_breaker invalid: {e}"))?;
        self.health.validate().map_err(|e| format!("health invalid: {e}"))?;
        Ok(())
    }

    /// Parse scheduler configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading scheduler config {}", path.display()))?;
        Self::from_json_str(&raw)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("loading scheduler config {}", path.display()))
    }

    /// Build configuration from the process environment.
    ///
    /// Loads a `.env` file if present, starts from `GATEKEEPER_CONFIG` (a JSON
    /// file path) or the defaults, then applies `GATEKEEPER_*` overrides.
    pub fn from_env() -> AppResult<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env file");
        }
        let mut cfg = match std::env::var(format!("{ENV_PREFIX}CONFIG")) {
            Ok(path) => Self::from_json_file(path)?,
            Err(_) => Self::default(),
        };
        cfg.apply_env_overrides(|key| std::env::var(key).ok())?;
        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }

    /// Apply `GATEKEEPER_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        override_from(&get, "DEFAULT_CONCURRENCY", &mut self.default_resource.max_concurrency)?;
        override_from(&get, "QUEUE_CAPACITY", &mut self.default_resource.queue_capacity)?;
        override_from(&get, "AUTO_REGISTER", &mut self.auto_register)?;
        override_from(&get, "DEFAULT_TIMEOUT_MS", &mut self.default_timeout_ms)?;
        override_from(&get, "SHUTDOWN_GRACE_MS", &mut self.shutdown_grace_ms)?;
        override_from(&get, "RETRY_MAX_ATTEMPTS", &mut self.retry.max_attempts)?;
        override_from(&get, "RETRY_BASE_DELAY_MS", &mut self.retry.base_delay_ms)?;
        override_from(&get, "RETRY_MAX_DELAY_MS", &mut self.retry.max_delay_ms)?;
        override_from(&get, "CB_FAILURE_THRESHOLD", &mut self.circuit_breaker.failure_threshold)?;
        override_from(&get, "CB_SUCCESS_THRESHOLD", &mut self.circuit_breaker.success_threshold)?;
        override_from(&get, "CB_OPEN_DURATION_MS", &mut self.circuit_breaker.open_duration_ms)?;
        override_from(&get, "HEALTH_INTERVAL_MS", &mut self.health.interval_ms)?;
        Ok(())
    }
}

fn override_from<T, G>(get: &G, name: &str, slot: &mut T) -> AppResult<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    if let Some(raw) = get(name) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{ENV_PREFIX}{name}={raw:?}: {e}"))?;
    }
    Ok(())
}

//! Periodic health assessment over breaker states and attempt outcomes.
//!
//! The monitor only reads shared state. Its verdict is advisory: blocking
//! traffic is left entirely to the circuit breakers.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{CircuitBreakerRegistry, CircuitState, MetricsRegistry};
use crate::config::HealthConfig;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Health classification, ordered from best to worst.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Everything within thresholds.
    #[default]
    Healthy,
    /// Success ratio between thresholds, or a breaker probing recovery.
    Degraded,
    /// Success ratio below the lower threshold, or a breaker open.
    Critical,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Critical => "critical",
        })
    }
}

/// Assessment of one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceHealth {
    /// Resource name.
    pub resource: String,
    /// Classification.
    pub status: HealthStatus,
    /// Breaker state at assessment time.
    pub circuit_state: CircuitState,
    /// Success ratio within the window, when enough samples exist.
    pub success_rate: Option<f64>,
    /// Attempts within the window.
    pub samples: usize,
    /// Waiting tasks as last published by the admission queue.
    pub queue_depth: usize,
    /// Running tasks as last published by the admission queue.
    pub in_flight: usize,
}

/// System-wide assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Worst status across resources; healthy when there are none.
    pub status: HealthStatus,
    /// Per-resource detail, sorted by name.
    pub resources: Vec<ResourceHealth>,
    /// One line per resource that is not healthy.
    pub reasons: Vec<String>,
}

/// Emitted whenever the aggregate status changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthEvent {
    /// Status before the change.
    pub previous: HealthStatus,
    /// Status after the change.
    pub current: HealthStatus,
    /// Why the current status is not healthy.
    pub reasons: Vec<String>,
}

/// Classify every resource known to `breakers` or `metrics`.
pub fn assess(
    config: &HealthConfig,
    breakers: &CircuitBreakerRegistry,
    metrics: &MetricsRegistry,
) -> HealthReport {
    let mut names: BTreeSet<String> = breakers.states().into_keys().collect();
    names.extend(metrics.entries().into_iter().map(|(name, _)| name.to_string()));

    let mut resources = Vec::with_capacity(names.len());
    let mut reasons = Vec::new();
    let mut status = HealthStatus::Healthy;

    for name in names {
        let circuit_state = breakers.state(&name);
        let resource_metrics = metrics.lookup(&name);
        let (ratio, samples) = resource_metrics
            .as_ref()
            .map_or((None, 0), |m| m.success_ratio(config.window()));
        let (queue_depth, in_flight) = resource_metrics
            .as_ref()
            .map_or((0, 0), |m| (m.queue_depth(), m.in_flight()));
        let success_rate = ratio.filter(|_| samples >= config.min_samples);

        let (resource_status, reason) = classify(config, circuit_state, success_rate);
        if let Some(reason) = reason {
            reasons.push(format!("{name}: {reason}"));
        }
        status = status.max(resource_status);
        resources.push(ResourceHealth {
            resource: name,
            status: resource_status,
            circuit_state,
            success_rate,
            samples,
            queue_depth,
            in_flight,
        });
    }

    HealthReport {
        status,
        resources,
        reasons,
    }
}

fn classify(
    config: &HealthConfig,
    circuit_state: CircuitState,
    success_rate: Option<f64>,
) -> (HealthStatus, Option<String>) {
    match (circuit_state, success_rate) {
        (CircuitState::Open, _) => (HealthStatus::Critical, Some("circuit open".to_string())),
        (_, Some(rate)) if rate < config.critical_threshold => (
            HealthStatus::Critical,
            Some(format!("success rate {rate:.2} below {:.2}", config.critical_threshold)),
        ),
        (_, Some(rate)) if rate <= config.healthy_threshold => (
            HealthStatus::Degraded,
            Some(format!("success rate {rate:.2} not above {:.2}", config.healthy_threshold)),
        ),
        (CircuitState::HalfOpen, _) => {
            (HealthStatus::Degraded, Some("circuit half-open".to_string()))
        }
        _ => (HealthStatus::Healthy, None),
    }
}

/// Background assessor that publishes aggregate status changes.
pub struct HealthMonitor {
    config: HealthConfig,
    breakers: Arc<CircuitBreakerRegistry>,
    metrics: Arc<MetricsRegistry>,
    current: Mutex<HealthStatus>,
    events: broadcast::Sender<HealthEvent>,
}

impl fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("config", &self.config)
            .field("current", &*self.current.lock())
            .finish_non_exhaustive()
    }
}

impl HealthMonitor {
    /// Create a monitor starting from `Healthy`.
    #[must_use]
    pub fn new(
        config: HealthConfig,
        breakers: Arc<CircuitBreakerRegistry>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            breakers,
            metrics,
            current: Mutex::new(HealthStatus::Healthy),
            events,
        }
    }

    /// Last published aggregate status.
    pub fn current(&self) -> HealthStatus {
        *self.current.lock()
    }

    /// Subscribe to aggregate status changes.
    pub fn subscribe(&self) -> broadcast::Receiver<HealthEvent> {
        self.events.subscribe()
    }

    /// Assess now without publishing anything.
    pub fn report(&self) -> HealthReport {
        assess(&self.config, &self.breakers, &self.metrics)
    }

    /// Assess now and publish a [`HealthEvent`] if the aggregate changed.
    pub fn evaluate(&self) -> HealthReport {
        let report = self.report();
        let previous = {
            let mut current = self.current.lock();
            std::mem::replace(&mut *current, report.status)
        };

        if previous != report.status {
            if report.status > previous {
                warn!(%previous, current = %report.status, reasons = ?report.reasons, "system health degraded");
            } else {
                info!(%previous, current = %report.status, "system health improved");
            }
            // No subscribers is fine.
            let _ = self.events.send(HealthEvent {
                previous,
                current: report.status,
                reasons: report.reasons.clone(),
            });
        }
        report
    }

    /// Evaluate every `interval` until `shutdown` fires.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!(interval_ms = self.config.interval_ms, "health monitor started");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.evaluate();
                }
            }
        }
        debug!("health monitor stopped");
    }
}

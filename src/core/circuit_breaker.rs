//! Per-resource circuit breakers.
//!
//! Each resource name maps to one [`CircuitBreaker`], created lazily on first
//! reference. State transitions:
//!
//! - **closed → open** after `failure_threshold` consecutive failures,
//! - **open → half-open** once `open_duration` has elapsed,
//! - **half-open → closed** after `success_threshold` successes,
//! - **half-open → open** on any failure.
//!
//! The open → half-open move is evaluated whenever the breaker is consulted or
//! observed, so no background timer is needed.
//!
//! Admission hands out a [`BreakerPermit`] stamped with the breaker's current
//! generation. Every transition starts a new generation, so an outcome that
//! arrives after the breaker has moved on (a call admitted while closed that
//! finishes during half-open) cannot free a trial slot or count as a
//! successful trial.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::CircuitBreakerConfig;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Circuit breaker state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow through.
    Closed,
    /// Calls fail fast.
    Open,
    /// A limited number of trial calls test for recovery.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        })
    }
}

/// A state transition of one breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitEvent {
    /// Resource whose breaker moved.
    pub resource: Arc<str>,
    /// State before the transition.
    pub from: CircuitState,
    /// State after the transition.
    pub to: CircuitState,
}

/// Admission ticket returned by [`CircuitBreaker::try_acquire`].
///
/// Hand it back through [`CircuitBreaker::record_outcome`] or
/// [`CircuitBreaker::release_trial`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a permit must be returned with the call outcome"]
pub struct BreakerPermit {
    generation: u64,
    trial: bool,
}

impl BreakerPermit {
    /// Whether this permit holds one of the half-open trial slots.
    #[must_use]
    pub const fn is_trial(&self) -> bool {
        self.trial
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    generation: u64,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    half_open_trials: u32,
    half_open_successes: u32,
}

impl BreakerState {
    const fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            generation: 0,
            consecutive_failures: 0,
            opened_at: None,
            half_open_trials: 0,
            half_open_successes: 0,
        }
    }
}

/// Circuit breaker for a single resource.
pub struct CircuitBreaker {
    name: Arc<str>,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
    events: broadcast::Sender<CircuitEvent>,
    /// Times the breaker has opened.
    open_count: AtomicU64,
    /// Calls refused while open or saturated half-open.
    rejected_count: AtomicU64,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state.lock().state)
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    fn new(
        name: Arc<str>,
        config: CircuitBreakerConfig,
        events: broadcast::Sender<CircuitEvent>,
    ) -> Self {
        Self {
            name,
            config,
            state: Mutex::new(BreakerState::new()),
            events,
            open_count: AtomicU64::new(0),
            rejected_count: AtomicU64::new(0),
        }
    }

    /// Resource name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state, applying an elapsed open timer first.
    pub fn state(&self) -> CircuitState {
        let mut state = self.state.lock();
        self.refresh(&mut state);
        state.state
    }

    /// Times this breaker has opened.
    pub fn open_count(&self) -> u64 {
        self.open_count.load(Ordering::Relaxed)
    }

    /// Calls refused by this breaker.
    pub fn rejected_count(&self) -> u64 {
        self.rejected_count.load(Ordering::Relaxed)
    }

    /// Decide whether a call may proceed now.
    ///
    /// In half-open the returned permit reserves one of the trial slots
    /// until it is handed back.
    pub fn try_acquire(&self) -> Option<BreakerPermit> {
        let mut state = self.state.lock();
        self.refresh(&mut state);
        match state.state {
            CircuitState::Closed => Some(BreakerPermit {
                generation: state.generation,
                trial: false,
            }),
            CircuitState::HalfOpen if state.half_open_trials < self.config.half_open_max_trials => {
                state.half_open_trials += 1;
                Some(BreakerPermit {
                    generation: state.generation,
                    trial: true,
                })
            }
            CircuitState::Open | CircuitState::HalfOpen => {
                self.rejected_count.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Record the outcome of the call admitted with `permit`.
    ///
    /// Outcomes from an earlier generation never touch the half-open trial
    /// or success counters. A stale failure still counts against the breaker.
    pub fn record_outcome(&self, permit: BreakerPermit, success: bool) {
        let mut state = self.state.lock();
        self.refresh(&mut state);
        let current = permit.generation == state.generation;
        if current && permit.trial && state.state == CircuitState::HalfOpen {
            state.half_open_trials = state.half_open_trials.saturating_sub(1);
        }

        if success {
            if !current {
                debug!(resource = %self.name, state = %state.state, "ignoring late success");
                return;
            }
            state.consecutive_failures = 0;
            if state.state == CircuitState::HalfOpen {
                state.half_open_successes += 1;
                if state.half_open_successes >= self.config.success_threshold {
                    self.transition(&mut state, CircuitState::Closed);
                }
            }
            return;
        }

        match state.state {
            CircuitState::Closed => {
                state.consecutive_failures += 1;
                if state.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        resource = %self.name,
                        failures = state.consecutive_failures,
                        "circuit breaker opened - too many failures"
                    );
                    self.transition(&mut state, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                warn!(resource = %self.name, "circuit breaker re-opened - trial call failed");
                self.transition(&mut state, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    /// Return the trial slot held by `permit` for a call that was abandoned
    /// before it produced an outcome.
    pub fn release_trial(&self, permit: BreakerPermit) {
        let mut state = self.state.lock();
        if permit.trial
            && permit.generation == state.generation
            && state.state == CircuitState::HalfOpen
        {
            state.half_open_trials = state.half_open_trials.saturating_sub(1);
        }
    }

    /// Permit standing for "the current period", used by the name-keyed
    /// registry calls that do not carry one.
    fn current_permit(&self) -> BreakerPermit {
        let mut state = self.state.lock();
        self.refresh(&mut state);
        BreakerPermit {
            generation: state.generation,
            trial: state.state == CircuitState::HalfOpen,
        }
    }

    /// Force the breaker back to closed.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        if state.state != CircuitState::Closed {
            info!(resource = %self.name, "circuit breaker manually reset");
            self.transition(&mut state, CircuitState::Closed);
        }
        state.consecutive_failures = 0;
    }

    fn refresh(&self, state: &mut BreakerState) {
        if state.state != CircuitState::Open {
            return;
        }
        let elapsed = state
            .opened_at
            .is_none_or(|at| at.elapsed() >= self.config.open_duration());
        if elapsed {
            info!(resource = %self.name, "circuit breaker transitioning to half-open");
            self.transition(state, CircuitState::HalfOpen);
        }
    }

    fn transition(&self, state: &mut BreakerState, to: CircuitState) {
        let from = state.state;
        state.state = to;
        state.generation += 1;
        state.half_open_trials = 0;
        state.half_open_successes = 0;
        match to {
            CircuitState::Open => {
                state.consecutive_failures = 0;
                state.opened_at = Some(Instant::now());
                self.open_count.fetch_add(1, Ordering::Relaxed);
            }
            CircuitState::Closed => {
                state.consecutive_failures = 0;
                state.opened_at = None;
                info!(resource = %self.name, "circuit breaker closed - resource recovered");
            }
            CircuitState::HalfOpen => {}
        }
        // No subscribers is fine.
        let _ = self.events.send(CircuitEvent {
            resource: Arc::clone(&self.name),
            from,
            to,
        });
    }
}

/// Process-local registry holding one breaker per resource name.
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: RwLock<HashMap<Arc<str>, Arc<CircuitBreaker>>>,
    events: broadcast::Sender<CircuitEvent>,
}

impl fmt::Debug for CircuitBreakerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("config", &self.config)
            .field("breakers", &self.breakers.read().len())
            .finish()
    }
}

impl CircuitBreakerRegistry {
    /// Create an empty registry; every breaker shares `config`.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            breakers: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Shared breaker settings.
    #[must_use]
    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Breaker for `name`, created on first reference.
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().get(name) {
            return Arc::clone(breaker);
        }
        let mut breakers = self.breakers.write();
        let breaker = breakers.entry(Arc::from(name)).or_insert_with_key(|key| {
            debug!(resource = %key, "creating circuit breaker");
            Arc::new(CircuitBreaker::new(
                Arc::clone(key),
                self.config.clone(),
                self.events.clone(),
            ))
        });
        Arc::clone(breaker)
    }

    /// Breaker for `name` if one exists.
    pub fn lookup(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().get(name).cloned()
    }

    /// Whether a call to `name` may proceed now.
    ///
    /// A half-open trial reserved here is returned by the next
    /// [`record_outcome`](Self::record_outcome) for `name`. Callers that can
    /// hold a permit should use [`CircuitBreaker::try_acquire`] instead.
    pub fn should_allow_operation(&self, name: &str) -> bool {
        self.get(name).try_acquire().is_some()
    }

    /// Record an outcome for `name` as belonging to the breaker's current
    /// period.
    pub fn record_outcome(&self, name: &str, success: bool) {
        let breaker = self.get(name);
        breaker.record_outcome(breaker.current_permit(), success);
    }

    /// Current state for `name`; unknown names read as closed.
    pub fn state(&self, name: &str) -> CircuitState {
        self.lookup(name)
            .map_or(CircuitState::Closed, |breaker| breaker.state())
    }

    /// Force the breaker for `name` back to closed.
    pub fn reset(&self, name: &str) {
        if let Some(breaker) = self.lookup(name) {
            breaker.reset();
        }
    }

    /// States of every known breaker.
    pub fn states(&self) -> HashMap<String, CircuitState> {
        self.breakers
            .read()
            .iter()
            .map(|(name, breaker)| (name.to_string(), breaker.state()))
            .collect()
    }

    /// Subscribe to state transitions of every breaker in this registry.
    pub fn subscribe(&self) -> broadcast::Receiver<CircuitEvent> {
        self.events.subscribe()
    }
}

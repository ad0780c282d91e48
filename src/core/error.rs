//! Error types for scheduler operations.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error tag attached by the work collaborator so failures can be classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The remote call did not answer in time.
    Timeout,
    /// Connection refused, reset, DNS failure and similar network errors.
    Connection,
    /// The remote signalled rate limiting.
    RateLimited,
    /// The remote signalled it is overloaded or temporarily unavailable.
    ServerBusy,
    /// The request itself is invalid and will never succeed.
    InvalidInput,
    /// Credentials or permissions were rejected.
    Unauthorized,
    /// Any other failure.
    Internal,
}

impl ErrorKind {
    /// Whether a failure of this kind is expected to resolve on retry.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Connection | Self::RateLimited | Self::ServerBusy
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::Connection => "connection",
            Self::RateLimited => "rate limited",
            Self::ServerBusy => "server busy",
            Self::InvalidInput => "invalid input",
            Self::Unauthorized => "unauthorized",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Failure reported by a [`WorkInvoker`](crate::core::WorkInvoker).
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct InvokeError {
    /// Classification tag read by the retry executor.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl InvokeError {
    /// Build an error with an explicit kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Network-level failure (transient).
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, message)
    }

    /// Remote asked us to slow down (transient).
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimited, message)
    }

    /// Remote is overloaded (transient).
    pub fn server_busy(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServerBusy, message)
    }

    /// Request can never succeed (permanent).
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    /// Unclassified failure (permanent).
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Whether this failure should be retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Waiting queue of the target resource is at capacity.
    #[error("queue full: {0}")]
    QueueFull(String),
    /// Resource was never registered and auto-registration is disabled.
    #[error("unknown resource: {0}")]
    UnknownResource(String),
    /// Circuit breaker refused admission.
    #[error("circuit open: {0}")]
    CircuitOpen(String),
    /// An attempt did not finish within the task timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// Retryable collaborator failure.
    #[error("transient failure: {0}")]
    TransientFailure(InvokeError),
    /// Non-retryable collaborator failure.
    #[error("permanent failure: {0}")]
    PermanentFailure(InvokeError),
    /// Every allowed attempt failed transiently.
    #[error("retry budget exhausted after {attempts} attempts: {last}")]
    RetryBudgetExhausted {
        /// Attempts made.
        attempts: u32,
        /// Last transient error observed.
        last: Box<SchedulerError>,
    },
    /// Scheduler no longer accepts or runs queued work.
    #[error("scheduler shutting down")]
    ShuttingDown,
    /// Task was still running when the shutdown grace period elapsed.
    #[error("task forcibly resolved at shutdown")]
    ShutdownForced,
    /// Caller cancelled the task.
    #[error("task cancelled")]
    Cancelled,
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SchedulerError {
    /// Classify a collaborator failure.
    #[must_use]
    pub fn from_invoke(err: InvokeError) -> Self {
        if err.is_transient() {
            Self::TransientFailure(err)
        } else {
            Self::PermanentFailure(err)
        }
    }

    /// Whether the retry executor may try again after this error.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::TransientFailure(_))
    }

    /// Innermost error, looking through `RetryBudgetExhausted`.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::RetryBudgetExhausted { last, .. } => last.root(),
            other => other,
        }
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;

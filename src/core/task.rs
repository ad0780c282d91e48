//! Task identity, priority and per-task options.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::completion::Completer;

/// Unique task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Task priority used for queue ordering.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Runs after everything else.
    Low,
    /// Default priority.
    #[default]
    Normal,
    /// Jumps ahead of normal and low work.
    High,
}

/// Caller-supplied options for a submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitOptions {
    /// Queue priority.
    #[serde(default)]
    pub priority: Priority,
    /// Per-attempt timeout; the scheduler default applies when absent.
    #[serde(default, with = "opt_millis")]
    pub timeout: Option<Duration>,
    /// Attempt budget override for this task only.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl SubmitOptions {
    /// Options with the given priority and defaults otherwise.
    #[must_use]
    pub fn with_priority(priority: Priority) -> Self {
        Self {
            priority,
            ..Self::default()
        }
    }

    /// Set the per-attempt timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the attempt budget for this task.
    #[must_use]
    pub const fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

/// Metadata describing a scheduled task.
#[derive(Debug, Clone)]
pub struct TaskMetadata {
    /// Unique task identifier.
    pub id: TaskId,
    /// Target resource name.
    pub resource: Arc<str>,
    /// Priority used for queue ordering.
    pub priority: Priority,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Attempt budget override.
    pub max_attempts: Option<u32>,
    /// Attempts made so far.
    pub attempts: u32,
    /// Monotonic submission instant, used for queue wait time.
    pub enqueued_at: Instant,
    /// Submission timestamp in milliseconds since epoch.
    pub submitted_at_ms: u128,
}

impl TaskMetadata {
    /// Fresh metadata for a normal-priority task stamped now.
    pub fn new(resource: impl Into<Arc<str>>, timeout: Duration) -> Self {
        Self {
            id: TaskId::new(),
            resource: resource.into(),
            priority: Priority::Normal,
            timeout,
            max_attempts: None,
            attempts: 0,
            enqueued_at: Instant::now(),
            submitted_at_ms: crate::util::clock::now_ms(),
        }
    }
}

/// A task owned by the admission queue or the retry executor.
pub struct ScheduledTask<P, T> {
    /// Metadata driving scheduling decisions.
    pub meta: TaskMetadata,
    /// Opaque payload handed to the work collaborator.
    pub payload: P,
    /// Resolve-once completion slot shared with the caller's handle.
    pub completer: Arc<Completer<T>>,
    /// Cancelled when the caller abandons the task.
    pub cancel: CancellationToken,
}

impl<P, T> fmt::Debug for ScheduledTask<P, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("meta", &self.meta)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

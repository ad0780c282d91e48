//! In-memory waiting queue ordered by priority, FIFO within a priority.

use std::collections::VecDeque;

use crate::core::{ScheduledTask, SchedulerError};

/// Bounded queue of tasks waiting for a concurrency slot.
///
/// A new task is inserted immediately before the first queued task of
/// strictly lower priority (or appended if there is none):
///
/// - `High` lands after every queued `High` task, ahead of all other work,
/// - `Normal` lands before the first `Low` task,
/// - `Low` is appended.
///
/// This keeps FIFO order among equal priorities. Insertion is O(n), dequeue
/// is O(1).
pub struct InMemoryQueue<P, T> {
    max_depth: usize,
    tasks: VecDeque<ScheduledTask<P, T>>,
}

impl<P, T> InMemoryQueue<P, T> {
    /// Create a queue holding at most `max_depth` tasks.
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            tasks: VecDeque::new(),
        }
    }

    /// Insert a task by priority. Fails with `QueueFull` at capacity.
    pub fn enqueue(&mut self, task: ScheduledTask<P, T>) -> Result<(), SchedulerError> {
        if self.tasks.len() >= self.max_depth {
            return Err(SchedulerError::QueueFull(task.meta.resource.to_string()));
        }
        let priority = task.meta.priority;
        match self.tasks.iter().position(|queued| queued.meta.priority < priority) {
            Some(idx) => self.tasks.insert(idx, task),
            None => self.tasks.push_back(task),
        }
        Ok(())
    }

    /// Pop the next task to dispatch.
    pub fn dequeue(&mut self) -> Option<ScheduledTask<P, T>> {
        self.tasks.pop_front()
    }

    /// Remove every waiting task, front to back.
    pub fn drain(&mut self) -> Vec<ScheduledTask<P, T>> {
        self.tasks.drain(..).collect()
    }

    /// Remove tasks whose caller cancelled them while they waited.
    pub fn remove_cancelled(&mut self) -> Vec<ScheduledTask<P, T>> {
        if !self.tasks.iter().any(|t| t.cancel.is_cancelled()) {
            return Vec::new();
        }
        let (cancelled, kept): (Vec<_>, Vec<_>) = self
            .tasks
            .drain(..)
            .partition(|t| t.cancel.is_cancelled());
        self.tasks = kept.into();
        cancelled
    }

    /// Maximum depth allowed for this queue.
    #[must_use]
    pub const fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Change the maximum depth. Tasks already queued are kept.
    pub fn set_max_depth(&mut self, max_depth: usize) {
        self.max_depth = max_depth;
    }

    /// Current depth.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

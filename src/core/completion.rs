//! Completion handles returned to callers and the resolve-once slot behind them.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::{SchedulerError, TaskId};

/// Terminal result of a task.
pub type TaskOutcome<T> = Result<T, SchedulerError>;

/// Producer side of a completion handle.
///
/// Several parties may race to resolve a task (the executor, a timeout, the
/// forced-shutdown path); only the first call to [`Completer::resolve`] wins.
pub struct Completer<T> {
    tx: Mutex<Option<oneshot::Sender<TaskOutcome<T>>>>,
}

impl<T> Completer<T> {
    /// Resolve the task. Returns `false` if it was already resolved.
    pub fn resolve(&self, outcome: TaskOutcome<T>) -> bool {
        let Some(tx) = self.tx.lock().take() else {
            return false;
        };
        // Receiver may be gone if the caller dropped the handle.
        let _ = tx.send(outcome);
        true
    }

    /// Whether a terminal outcome has been delivered.
    pub fn is_resolved(&self) -> bool {
        self.tx.lock().is_none()
    }
}

/// Awaitable handle resolved exactly once with the task outcome.
///
/// Dropping the handle before it resolves abandons the task: its cancellation
/// token fires, queued work is skipped and in-flight work is told to abort.
/// Use [`CompletionHandle::detach`] for fire-and-forget submissions.
#[must_use = "dropping a completion handle cancels the task"]
pub struct CompletionHandle<T> {
    id: TaskId,
    rx: oneshot::Receiver<TaskOutcome<T>>,
    cancel: CancellationToken,
    detached: bool,
}

impl<T> CompletionHandle<T> {
    /// Identifier assigned at submission.
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Cancel the task. Resolves with [`SchedulerError::Cancelled`] unless it
    /// already finished.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that fires when this task is cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Let the task run to completion without anyone awaiting it.
    pub fn detach(mut self) {
        self.detached = true;
    }
}

impl<T> std::fmt::Debug for CompletionHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionHandle")
            .field("id", &self.id)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<T> Future for CompletionHandle<T> {
    type Output = TaskOutcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // Sender dropped without resolving; only happens if the runtime
            // tore the task down.
            Poll::Ready(Err(_)) => Poll::Ready(Err(SchedulerError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> Drop for CompletionHandle<T> {
    fn drop(&mut self) {
        if !self.detached {
            self.cancel.cancel();
        }
    }
}

/// Create a linked completer/handle pair for a new task.
pub(crate) fn completion_pair<T>(
    id: TaskId,
    cancel: CancellationToken,
) -> (Completer<T>, CompletionHandle<T>) {
    let (tx, rx) = oneshot::channel();
    (
        Completer {
            tx: Mutex::new(Some(tx)),
        },
        CompletionHandle {
            id,
            rx,
            cancel,
            detached: false,
        },
    )
}

//! Serializable request/response models for exposing a scheduler over an
//! external API.

use serde::{Deserialize, Serialize};

use crate::core::{
    CompletionHandle, HealthStatus, Scheduler, SchedulerError, Spawn, SubmitOptions, TaskId,
    WorkInvoker,
};

/// Task submission payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSubmission<P> {
    /// Target resource name.
    pub resource: String,
    /// Priority, timeout and attempt budget.
    #[serde(flatten)]
    pub options: SubmitOptions,
    /// Opaque payload.
    pub payload: P,
}

/// Acknowledgement of an accepted submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionAck {
    /// Identifier assigned to the task.
    pub task_id: TaskId,
    /// Resource the task was queued on.
    pub resource: String,
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// `false` only when the aggregate status is critical.
    pub ok: bool,
    /// Aggregate status.
    pub status: HealthStatus,
    /// Why the status is not healthy.
    pub reasons: Vec<String>,
}

/// Submit a decoded request. The handle resolves with the task outcome.
pub fn submit_task<P, T, I, S>(
    scheduler: &Scheduler<P, T, I, S>,
    req: TaskSubmission<P>,
) -> Result<(SubmissionAck, CompletionHandle<T>), SchedulerError>
where
    P: Clone + Send + Sync + 'static,
    T: Send + 'static,
    I: WorkInvoker<P, T>,
    S: Spawn + Clone + Send + Sync + 'static,
{
    let handle = scheduler.submit(&req.resource, req.payload, req.options)?;
    let ack = SubmissionAck {
        task_id: handle.id(),
        resource: req.resource,
    };
    Ok((ack, handle))
}

/// Assess the scheduler's health now.
pub fn health<P, T, I, S>(scheduler: &Scheduler<P, T, I, S>) -> Health
where
    P: Clone + Send + Sync + 'static,
    T: Send + 'static,
    I: WorkInvoker<P, T>,
    S: Spawn + Clone + Send + Sync + 'static,
{
    let report = scheduler.health();
    Health {
        ok: report.status != HealthStatus::Critical,
        status: report.status,
        reasons: report.reasons,
    }
}

//! Work collaborator traits.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::InvokeError;

/// Performs the actual unit of work for a task against a resource.
///
/// The scheduler never looks inside the payload. Implementations must:
///
/// - abort promptly once `cancel` fires (attempt timeout, caller cancellation
///   or forced shutdown), and
/// - tag failures with an [`ErrorKind`](super::ErrorKind) so the retry
///   executor can tell transient from permanent errors.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_gatekeeper::core::{InvokeError, WorkInvoker};
/// use tokio_util::sync::CancellationToken;
///
/// #[derive(Clone)]
/// struct HttpInvoker { client: reqwest::Client }
///
/// #[async_trait]
/// impl WorkInvoker<String, String> for HttpInvoker {
///     async fn invoke(
///         &self,
///         resource: &str,
///         url: String,
///         cancel: CancellationToken,
///     ) -> Result<String, InvokeError> {
///         tokio::select! {
///             () = cancel.cancelled() => Err(InvokeError::internal("aborted")),
///             res = self.client.get(url).send() => {
///                 let resp = res.map_err(|e| InvokeError::connection(e.to_string()))?;
///                 resp.text().await.map_err(|e| InvokeError::connection(e.to_string()))
///             }
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait WorkInvoker<P, T>: Send + Sync + 'static
where
    P: Clone + Send + Sync + 'static,
    T: Send + 'static,
{
    /// Run one attempt of the task's work.
    async fn invoke(
        &self,
        resource: &str,
        payload: P,
        cancel: CancellationToken,
    ) -> Result<T, InvokeError>;
}

/// Degraded path taken when a resource's circuit breaker refuses admission.
///
/// Without a fallback the task fails with `CircuitOpen`.
#[async_trait]
pub trait FallbackHandler<P, T>: Send + Sync + 'static {
    /// Produce a substitute result for a refused task.
    async fn fallback(&self, resource: &str, payload: P) -> Result<T, InvokeError>;
}

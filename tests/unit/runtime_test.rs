//! Tests for runtime adapters and API models

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use prometheus_gatekeeper::core::{InvokeError, Priority, Scheduler, Spawn, WorkInvoker};
use prometheus_gatekeeper::runtime::{api, TaskSubmission, TokioSpawner};
use tokio_util::sync::CancellationToken;

struct Echo;

#[async_trait]
impl WorkInvoker<String, String> for Echo {
    async fn invoke(
        &self,
        resource: &str,
        payload: String,
        _cancel: CancellationToken,
    ) -> Result<String, InvokeError> {
        Ok(format!("{resource}:{payload}"))
    }
}

#[test]
fn test_task_submission_from_json() {
    let req: TaskSubmission<String> = serde_json::from_str(
        r#"{ "resource": "llm", "priority": "low", "timeout": 1500, "payload": "hi" }"#,
    )
    .unwrap();
    assert_eq!(req.resource, "llm");
    assert_eq!(req.options.priority, Priority::Low);
    assert_eq!(req.options.timeout, Some(std::time::Duration::from_millis(1500)));
    assert_eq!(req.payload, "hi");
}

#[tokio::test]
async fn test_submit_task_acknowledges() {
    let scheduler = Scheduler::<String, String, _, _>::new(
        prometheus_gatekeeper::SchedulerConfig::default(),
        Arc::new(Echo),
        TokioSpawner::current(),
    )
    .unwrap();
    let req: TaskSubmission<String> =
        serde_json::from_str(r#"{ "resource": "llm", "payload": "ping" }"#).unwrap();

    let (ack, handle) = api::submit_task(&scheduler, req).unwrap();
    assert_eq!(ack.resource, "llm");
    assert_eq!(ack.task_id, handle.id());
    assert_eq!(handle.await.unwrap(), "llm:ping");

    let health = api::health(&scheduler);
    assert!(health.ok);
    assert!(health.reasons.is_empty());
}

#[test]
fn test_owned_runtime_spawner() {
    let spawner = TokioSpawner::with_worker_threads(2).unwrap();
    let counter = Arc::new(AtomicU32::new(0));
    let (tx, rx) = std::sync::mpsc::channel();

    let c = Arc::clone(&counter);
    spawner.spawn(async move {
        c.fetch_add(1, Ordering::SeqCst);
        tx.send(()).unwrap();
    });

    rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn test_owned_runtime_dropped_from_its_own_worker() {
    let spawner = TokioSpawner::with_worker_threads(1).unwrap();
    let (go_tx, go_rx) = tokio::sync::oneshot::channel::<()>();
    let (done_tx, done_rx) = std::sync::mpsc::channel();

    let last = spawner.clone();
    spawner.spawn(async move {
        let _ = go_rx.await;
        // Final reference to the runtime, released on its own worker.
        drop(last);
        done_tx.send(()).unwrap();
    });

    drop(spawner);
    go_tx.send(()).unwrap();
    done_rx
        .recv_timeout(std::time::Duration::from_secs(5))
        .expect("task finished after releasing the runtime");
}

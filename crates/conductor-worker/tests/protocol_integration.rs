#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Status-protocol integration test over the file-backed store.
//!
//! Plays both sides of the zero-trust channel: an assignment is written
//! the way the scheduler writes it, the worker discovers it by re-reading
//! its own record, and the terminal status round-trips through JSON files
//! on disk.

use async_trait::async_trait;
use conductor_core::{
    AgentClass, AgentId, AgentRecord, AgentStatus, ConductorResult, FileStateStore, StateStore,
    Task, TaskCategory, TaskPriority, TaskSpec,
};
use conductor_resilience::ResilienceConfig;
use conductor_router::{ExecutionOutcome, TaskExecutor};
use conductor_worker::{Worker, WorkerEvent};
use std::sync::Arc;

struct EchoExecutor;

#[async_trait]
impl TaskExecutor for EchoExecutor {
    async fn execute(&self, task: &Task) -> ConductorResult<ExecutionOutcome> {
        Ok(ExecutionOutcome::completed(format!("echo {}", task.id))
            .with_output_refs(vec![format!("out/{}.txt", task.id)]))
    }
}

fn routed_task(id: &str) -> Task {
    Task::from_spec(
        TaskSpec {
            id: id.into(),
            description: "echo".into(),
            dependencies: vec![],
            priority: TaskPriority::Normal,
            category: TaskCategory::CodeGeneration,
            multi_perspective: false,
            estimated_tokens: None,
        },
        AgentClass::Builder,
        false,
    )
}

fn instant_resilience() -> ResilienceConfig {
    ResilienceConfig {
        max_retries: 0,
        base_delay_ms: 0,
        max_delay_ms: 0,
        jitter: false,
        ..ResilienceConfig::default()
    }
}

/// Write the assignment exactly the way the scheduler does.
async fn assign(store: &dyn StateStore, agent_id: &AgentId, task_id: &str) {
    let mut record = store.get_agent(agent_id).await.unwrap().unwrap();
    record.status = AgentStatus::Busy;
    record.current_task_id = Some(task_id.into());
    record.progress = 0.0;
    record.touch();
    store.put_agent(&record).await.unwrap();
}

#[tokio::test]
async fn test_assignment_roundtrip_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStateStore::new(dir.path()).await.unwrap());
    store.put_task(&routed_task("t1")).await.unwrap();

    let worker = Worker::new(
        AgentId::new("w1"),
        AgentClass::Builder,
        store.clone(),
        Arc::new(EchoExecutor),
    )
    .with_resilience(&instant_resilience());

    worker.register().await.unwrap();
    assert_eq!(worker.poll_once().await.unwrap(), WorkerEvent::Idle);

    assign(store.as_ref(), worker.id(), "t1").await;

    // the worker discovers the assignment purely from its record
    assert_eq!(
        worker.poll_once().await.unwrap(),
        WorkerEvent::Executed("t1".into())
    );

    let record = store.get_agent(worker.id()).await.unwrap().unwrap();
    assert_eq!(record.status, AgentStatus::Completed);
    assert_eq!(record.progress, 1.0);
    assert_eq!(record.output_refs, vec!["out/t1.txt".to_string()]);
    // the scheduler, not the worker, clears the assignment
    assert_eq!(record.current_task_id, Some("t1".into()));

    // until that happens the worker stands by
    assert_eq!(
        worker.poll_once().await.unwrap(),
        WorkerEvent::AwaitingReconcile
    );

    // scheduler-side reset, then the worker is available again
    let mut record = store.get_agent(worker.id()).await.unwrap().unwrap();
    record.status = AgentStatus::Idle;
    record.current_task_id = None;
    record.progress = 0.0;
    record.output_refs.clear();
    store.put_agent(&record).await.unwrap();

    assert_eq!(worker.poll_once().await.unwrap(), WorkerEvent::Idle);
}

#[tokio::test]
async fn test_worker_restart_adopts_pending_assignment() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStateStore::new(dir.path()).await.unwrap());
    store.put_task(&routed_task("t1")).await.unwrap();

    // a previous worker incarnation registered and was assigned t1
    store
        .put_agent(&AgentRecord::new(AgentId::new("w1"), AgentClass::Builder))
        .await
        .unwrap();
    assign(store.as_ref(), &AgentId::new("w1"), "t1").await;

    // the restarted process must not wipe the assignment
    let worker = Worker::new(
        AgentId::new("w1"),
        AgentClass::Builder,
        store.clone(),
        Arc::new(EchoExecutor),
    )
    .with_resilience(&instant_resilience());
    worker.register().await.unwrap();

    assert_eq!(
        worker.poll_once().await.unwrap(),
        WorkerEvent::Executed("t1".into())
    );
}

#[tokio::test]
async fn test_idle_heartbeat_refreshes_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStateStore::new(dir.path()).await.unwrap());

    let worker = Worker::new(
        AgentId::new("w1"),
        AgentClass::Builder,
        store.clone(),
        Arc::new(EchoExecutor),
    );
    worker.register().await.unwrap();

    let before = store.get_agent(worker.id()).await.unwrap().unwrap();
    worker.poll_once().await.unwrap();
    worker.poll_once().await.unwrap();
    let after = store.get_agent(worker.id()).await.unwrap().unwrap();

    assert_eq!(after.status, AgentStatus::Idle);
    assert_eq!(after.version, before.version + 2);
    assert!(after.last_updated >= before.last_updated);
}

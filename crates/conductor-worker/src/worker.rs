use conductor_core::{
    AgentClass, AgentId, AgentRecord, AgentStatus, ConductorError, ConductorResult, StateStore,
    Task, TaskId,
};
use conductor_resilience::{ErrorTracker, FallbackHandler, ResilienceConfig, ResilientCall};
use conductor_router::{ExecutionOutcome, HybridExecutor, HybridResult, TaskExecutor};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Knobs for the worker loop.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Pause between polls of the worker's own record.
    pub poll_interval: Duration,
    /// Cadence of record rewrites while idle or executing. Rewriting is
    /// what keeps the scheduler's staleness detector at bay.
    pub heartbeat_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(2),
        }
    }
}

/// What one poll of the worker's record led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// No assignment; heartbeat written.
    Idle,
    /// The assigned task was executed and a terminal status written.
    Executed(TaskId),
    /// A terminal status is already on the record; the scheduler has not
    /// reconciled it yet.
    AwaitingReconcile,
}

/// Retries for a worker-side record write that keeps losing the version
/// race.
const MAX_WRITE_ATTEMPTS: u32 = 5;

/// Re-read, re-apply, and put the worker's record, retrying on version
/// conflicts. Only worker-owned fields should be touched by `apply`;
/// re-reading before every attempt keeps concurrent scheduler writes to
/// the assignment fields intact.
async fn update_record<F>(
    store: &dyn StateStore,
    id: &AgentId,
    apply: F,
) -> ConductorResult<()>
where
    F: Fn(&mut AgentRecord),
{
    for _ in 0..MAX_WRITE_ATTEMPTS {
        let Some(mut record) = store.get_agent(id).await? else {
            return Err(ConductorError::Store(format!(
                "agent record '{id}' vanished from the store"
            )));
        };
        apply(&mut record);
        record.touch();
        match store.put_agent(&record).await {
            Ok(()) => return Ok(()),
            Err(ConductorError::VersionConflict(detail)) => {
                debug!(agent_id = %id, %detail, "Record write lost the race, re-reading");
            }
            Err(e) => return Err(e),
        }
    }
    Err(ConductorError::Store(format!(
        "agent record '{id}': gave up after {MAX_WRITE_ATTEMPTS} version conflicts"
    )))
}

/// A single worker process.
///
/// Workers never receive calls from the scheduler. The loop reads the
/// worker's own durable record; a `Busy` record naming a task is the
/// assignment. Execution is wrapped in the resilience layer, and the
/// outcome is written back as a terminal status — with `current_task_id`
/// left in place, because only the scheduler may clear it.
pub struct Worker {
    id: AgentId,
    class: AgentClass,
    store: Arc<dyn StateStore>,
    executor: Arc<dyn TaskExecutor>,
    /// Executor of the other class, enabling hybrid fan-out.
    hybrid_peer: Option<Arc<dyn TaskExecutor>>,
    config: WorkerConfig,
    resilient: ResilientCall,
    fallbacks: FallbackHandler<ExecutionOutcome>,
}

impl Worker {
    /// A worker with default loop and resilience settings.
    pub fn new(
        id: AgentId,
        class: AgentClass,
        store: Arc<dyn StateStore>,
        executor: Arc<dyn TaskExecutor>,
    ) -> Self {
        let tracker = Arc::new(ErrorTracker::default());
        let resilient = ResilientCall::from_config(
            &Self::operation_name(class),
            &ResilienceConfig::default(),
            tracker,
        );
        Self {
            id,
            class,
            store,
            executor,
            hybrid_peer: None,
            config: WorkerConfig::default(),
            resilient,
            fallbacks: FallbackHandler::new(),
        }
    }

    fn operation_name(class: AgentClass) -> String {
        format!("execute:{class}")
    }

    /// Replace the loop settings.
    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Rebuild the protected call from the given resilience settings.
    pub fn with_resilience(mut self, config: &ResilienceConfig) -> Self {
        let tracker = Arc::new(ErrorTracker::new(config.tracker_capacity));
        self.resilient =
            ResilientCall::from_config(&Self::operation_name(self.class), config, tracker);
        self
    }

    /// Provide the other class's executor so hybrid tasks can fan out.
    pub fn with_hybrid_peer(mut self, peer: Arc<dyn TaskExecutor>) -> Self {
        self.hybrid_peer = Some(peer);
        self
    }

    /// Replace the fallback registry.
    pub fn with_fallbacks(mut self, fallbacks: FallbackHandler<ExecutionOutcome>) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    /// This worker's id.
    pub fn id(&self) -> &AgentId {
        &self.id
    }

    /// The tracker holding this worker's terminal execution errors.
    pub fn error_tracker(&self) -> &Arc<ErrorTracker> {
        self.resilient.tracker()
    }

    /// Write the initial idle record, unless one already exists — a
    /// restarted worker adopts its old record, and any assignment on it
    /// is simply picked up by the next poll.
    pub async fn register(&self) -> ConductorResult<()> {
        if self.store.get_agent(&self.id).await?.is_none() {
            self.store
                .put_agent(&AgentRecord::new(self.id.clone(), self.class))
                .await?;
            info!(agent_id = %self.id, class = %self.class, "Worker registered");
        } else {
            info!(agent_id = %self.id, class = %self.class, "Worker resumed existing record");
        }
        Ok(())
    }

    /// Poll the record once and act on it.
    pub async fn poll_once(&self) -> ConductorResult<WorkerEvent> {
        let Some(record) = self.store.get_agent(&self.id).await? else {
            return Err(ConductorError::Store(format!(
                "agent record '{}' vanished from the store",
                self.id
            )));
        };

        match record.status {
            AgentStatus::Busy => match record.current_task_id.clone() {
                Some(task_id) => {
                    self.execute_assignment(&task_id).await?;
                    Ok(WorkerEvent::Executed(task_id))
                }
                None => {
                    warn!(agent_id = %self.id, "Busy record without a task, heartbeating");
                    self.heartbeat().await?;
                    Ok(WorkerEvent::Idle)
                }
            },
            AgentStatus::Idle => {
                self.heartbeat().await?;
                Ok(WorkerEvent::Idle)
            }
            AgentStatus::Completed | AgentStatus::Failed => Ok(WorkerEvent::AwaitingReconcile),
        }
    }

    /// Run the worker loop forever (until the task it lives in is
    /// aborted).
    pub async fn run(&self) -> ConductorResult<()> {
        self.register().await?;
        loop {
            self.poll_once().await?;
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    async fn heartbeat(&self) -> ConductorResult<()> {
        update_record(self.store.as_ref(), &self.id, |_| {}).await
    }

    /// Execute the assigned task and write the terminal outcome.
    async fn execute_assignment(&self, task_id: &TaskId) -> ConductorResult<()> {
        let Some(task) = self.store.get_task(task_id).await? else {
            warn!(agent_id = %self.id, task_id = %task_id, "Assigned task not found in store");
            return self
                .write_terminal(
                    task_id,
                    &ExecutionOutcome::failed(format!("assigned task '{task_id}' not found")),
                )
                .await;
        };

        info!(
            agent_id = %self.id,
            task_id = %task_id,
            category = %task.category,
            hybrid = task.hybrid,
            "Executing assignment"
        );

        // keep rewriting the record while the execution runs, so the
        // scheduler can tell a slow worker from a dead one
        let heartbeat = self.spawn_heartbeat();
        let result = self.execute_protected(&task).await;
        heartbeat.abort();

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => ExecutionOutcome::failed(e.to_string()),
        };
        self.write_terminal(task_id, &outcome).await
    }

    fn spawn_heartbeat(&self) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let id = self.id.clone();
        let interval = self.config.heartbeat_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if let Err(e) = update_record(store.as_ref(), &id, |_| {}).await {
                    warn!(agent_id = %id, error = %e, "Heartbeat write failed");
                }
            }
        })
    }

    /// The actual work, wrapped in retry + circuit breaker + fallback.
    /// Hybrid tasks fan out to both classes when a peer executor is
    /// available.
    async fn execute_protected(&self, task: &Task) -> ConductorResult<ExecutionOutcome> {
        if task.hybrid {
            if let Some(peer) = &self.hybrid_peer {
                let (planner, builder) = match self.class {
                    AgentClass::Planner => (Arc::clone(&self.executor), Arc::clone(peer)),
                    AgentClass::Builder => (Arc::clone(peer), Arc::clone(&self.executor)),
                };
                let hybrid = HybridExecutor::new(planner, builder);
                return self
                    .resilient
                    .run(
                        || async { hybrid.execute(task).await.map(HybridResult::into_outcome) },
                        &self.fallbacks,
                    )
                    .await;
            }
            warn!(
                agent_id = %self.id,
                task_id = %task.id,
                "Hybrid task but no peer executor, running single-class"
            );
        }

        self.resilient
            .run(|| self.executor.execute(task), &self.fallbacks)
            .await
    }

    /// Write the terminal status for the finished execution, leaving
    /// `current_task_id` populated for the scheduler to reconcile. If the
    /// assignment changed underneath us (staleness takeover), the outcome
    /// is discarded.
    async fn write_terminal(
        &self,
        task_id: &TaskId,
        outcome: &ExecutionOutcome,
    ) -> ConductorResult<()> {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let Some(mut record) = self.store.get_agent(&self.id).await? else {
                return Err(ConductorError::Store(format!(
                    "agent record '{}' vanished from the store",
                    self.id
                )));
            };

            if record.current_task_id.as_ref() != Some(task_id) {
                warn!(
                    agent_id = %self.id,
                    task_id = %task_id,
                    "Assignment changed during execution, dropping outcome"
                );
                return Ok(());
            }

            if outcome.is_completed() {
                record.status = AgentStatus::Completed;
                record.progress = 1.0;
                record.errors.clear();
                record.output_refs = outcome.output_refs.clone();
            } else {
                record.status = AgentStatus::Failed;
                record.errors = match &outcome.error {
                    Some(error) => vec![error.clone()],
                    None => vec!["execution failed without detail".to_string()],
                };
            }
            record.touch();

            match self.store.put_agent(&record).await {
                Ok(()) => {
                    info!(
                        agent_id = %self.id,
                        task_id = %task_id,
                        completed = outcome.is_completed(),
                        "Terminal status written"
                    );
                    return Ok(());
                }
                Err(ConductorError::VersionConflict(detail)) => {
                    debug!(agent_id = %self.id, %detail, "Terminal write lost the race, re-reading");
                }
                Err(e) => return Err(e),
            }
        }
        Err(ConductorError::Store(format!(
            "agent record '{}': gave up after {MAX_WRITE_ATTEMPTS} version conflicts",
            self.id
        )))
    }
}

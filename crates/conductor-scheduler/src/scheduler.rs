use crate::graph::TaskGraph;
use crate::report::RunReport;
use chrono::Utc;
use conductor_core::{
    AgentId, AgentRecord, AgentStatus, ConductorError, ConductorResult, SchedulerLease, StateStore,
    TaskId,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Knobs for the scheduling loop.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Pause between scheduling passes.
    pub poll_interval: Duration,
    /// Force-fail a task whose worker has not rewritten its record for
    /// this long. `None` disables staleness detection.
    pub stale_timeout: Option<Duration>,
    /// Age after which another scheduler's lease is considered dead.
    pub lease_ttl: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            stale_timeout: Some(Duration::from_secs(300)),
            lease_ttl: Duration::from_secs(30),
        }
    }
}

/// The dependency-aware scheduling loop.
///
/// Each pass reconciles worker status records into the task graph,
/// computes the ready set, assigns ready tasks to idle matching agents,
/// and persists the task set. Workers are never called directly: the
/// durable agent records are the only channel, and the scheduler is the
/// only writer of their assignment fields.
pub struct Scheduler {
    store: Arc<dyn StateStore>,
    graph: TaskGraph,
    config: SchedulerConfig,
    /// This instance's lease identity.
    holder: String,
    /// Last progress seen per busy agent (local view only, no task
    /// transition is derived from it).
    progress_view: HashMap<AgentId, f64>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn StateStore>, graph: TaskGraph, config: SchedulerConfig) -> Self {
        Self {
            store,
            graph,
            config,
            holder: format!("scheduler-{}", Uuid::new_v4()),
            progress_view: HashMap::new(),
        }
    }

    /// The graph as currently reconciled (for inspection and tests).
    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// Claim the store-level leader lease, refusing to start while a live
    /// lease is held by someone else.
    pub async fn acquire_lease(&self) -> ConductorResult<()> {
        if let Some(lease) = self.store.get_lease().await? {
            let age = Utc::now().signed_duration_since(lease.renewed_at);
            let live = age.to_std().map_or(true, |age| age < self.config.lease_ttl);
            if lease.holder != self.holder && live {
                return Err(ConductorError::Scheduler(format!(
                    "another scheduler ('{}') holds the lease",
                    lease.holder
                )));
            }
            if lease.holder != self.holder {
                warn!(stale_holder = %lease.holder, "Taking over an expired scheduler lease");
            }
        }
        self.store
            .put_lease(&SchedulerLease::held_by(self.holder.clone()))
            .await
    }

    async fn renew_lease(&self) -> ConductorResult<()> {
        self.store
            .put_lease(&SchedulerLease::held_by(self.holder.clone()))
            .await
    }

    async fn release_lease(&self) -> ConductorResult<()> {
        self.store.clear_lease().await
    }

    /// One scheduling pass: reconcile, compute ready set, assign, persist.
    pub async fn tick(&mut self) -> ConductorResult<()> {
        self.reconcile().await?;
        self.assign_ready().await?;
        self.persist().await?;
        Ok(())
    }

    /// Run passes until every task is terminal, then report.
    pub async fn run(&mut self) -> ConductorResult<RunReport> {
        self.acquire_lease().await?;
        let started = Instant::now();
        info!(
            tasks = self.graph.total_count(),
            holder = %self.holder,
            "Scheduler started"
        );

        loop {
            self.tick().await?;
            self.renew_lease().await?;
            if self.graph.is_done() {
                break;
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }

        let report = RunReport::from_graph(&self.graph, started.elapsed());
        self.release_lease().await?;
        info!(
            completed = report.completed_tasks,
            failed = report.failed.len(),
            "Scheduler finished"
        );
        Ok(report)
    }

    /// Fold every agent's durable record back into the task graph.
    ///
    /// Terminal records mark their task completed/failed and the agent is
    /// freed (reset to idle — the scheduler is the only actor allowed to
    /// do that). Busy records only update the staleness watch.
    async fn reconcile(&mut self) -> ConductorResult<()> {
        for record in self.store.list_agents().await? {
            match record.status {
                AgentStatus::Completed => {
                    if let Some(task_id) = record.current_task_id.clone() {
                        info!(agent_id = %record.agent_id, task_id = %task_id, "Task completed");
                        self.graph.mark_completed(&task_id);
                    } else {
                        warn!(agent_id = %record.agent_id, "Completed record without a task");
                    }
                    self.free_agent(record).await;
                }
                AgentStatus::Failed => {
                    if let Some(task_id) = record.current_task_id.clone() {
                        let reason = if record.errors.is_empty() {
                            "worker reported failure without detail".to_string()
                        } else {
                            record.errors.join("; ")
                        };
                        warn!(agent_id = %record.agent_id, task_id = %task_id, %reason, "Task failed");
                        self.graph.mark_failed(&task_id, reason);
                    }
                    self.free_agent(record).await;
                }
                AgentStatus::Busy => self.observe_busy(&record).await,
                AgentStatus::Idle => {
                    self.progress_view.remove(&record.agent_id);
                }
            }
        }
        Ok(())
    }

    /// Copy a busy agent's progress into the local view, and force-fail
    /// its task once the record has gone unwritten past the staleness
    /// timeout — a worker that stopped rewriting its own record is
    /// presumed dead.
    async fn observe_busy(&mut self, record: &AgentRecord) {
        let previous = self
            .progress_view
            .insert(record.agent_id.clone(), record.progress);
        if previous != Some(record.progress) {
            debug!(agent_id = %record.agent_id, progress = record.progress, "Progress update");
        }

        let Some(stale_timeout) = self.config.stale_timeout else {
            return;
        };
        let age = Utc::now().signed_duration_since(record.last_updated);
        let expired = age.to_std().map_or(false, |age| age >= stale_timeout);
        if !expired {
            return;
        }

        let Some(task_id) = record.current_task_id.clone() else {
            return;
        };
        warn!(
            agent_id = %record.agent_id,
            task_id = %task_id,
            progress = record.progress,
            "Record stalled past timeout, force-failing task"
        );
        self.graph.mark_failed(
            &task_id,
            format!(
                "progress stalled at {:.0}% for {}s (worker presumed dead)",
                record.progress * 100.0,
                stale_timeout.as_secs()
            ),
        );
        self.free_agent(record.clone()).await;
    }

    /// Reset a terminal (or stalled) agent record back to idle.
    ///
    /// A version conflict here means the worker wrote concurrently; the
    /// record is left alone and picked up again next pass.
    async fn free_agent(&mut self, mut record: AgentRecord) {
        self.progress_view.remove(&record.agent_id);
        record.status = AgentStatus::Idle;
        record.current_task_id = None;
        record.progress = 0.0;
        record.errors.clear();
        record.output_refs.clear();
        record.touch();

        match self.store.put_agent(&record).await {
            Ok(()) => {}
            Err(ConductorError::VersionConflict(detail)) => {
                debug!(agent_id = %record.agent_id, %detail, "Deferred agent reset to next pass");
            }
            Err(e) => warn!(agent_id = %record.agent_id, error = %e, "Failed to reset agent"),
        }
    }

    /// Assign ready tasks to idle agents of the matching class, most
    /// urgent first. Tasks with no idle match stay pending.
    async fn assign_ready(&mut self) -> ConductorResult<()> {
        let ready = self.graph.ready_ids();
        if ready.is_empty() {
            return Ok(());
        }

        let mut idle: Vec<AgentRecord> = self
            .store
            .list_agents()
            .await?
            .into_iter()
            .filter(|record| record.status == AgentStatus::Idle)
            .collect();

        for task_id in ready {
            self.graph.mark_ready(&task_id);
            let Some(task) = self.graph.get(&task_id) else {
                continue;
            };

            let matched = idle
                .iter()
                .position(|agent| agent.agent_class.matches(task.agent_class));
            let Some(position) = matched else {
                debug!(task_id = %task_id, class = %task.agent_class, "No idle agent, task stays pending");
                continue;
            };

            let mut agent = idle.remove(position);
            agent.status = AgentStatus::Busy;
            agent.current_task_id = Some(task_id.clone());
            agent.progress = 0.0;
            agent.errors.clear();
            agent.output_refs.clear();
            agent.touch();

            match self.store.put_agent(&agent).await {
                Ok(()) => {
                    info!(task_id = %task_id, agent_id = %agent.agent_id, "Assigned task");
                    self.graph.mark_in_progress(&task_id);
                    self.progress_view.insert(agent.agent_id.clone(), 0.0);
                }
                Err(ConductorError::VersionConflict(detail)) => {
                    warn!(agent_id = %agent.agent_id, %detail, "Assignment lost a write race, retrying next pass");
                }
                Err(e) => return Err(e),
            }
        }

        self.graph.revert_unassigned();
        Ok(())
    }

    /// Persist the full task set.
    async fn persist(&self) -> ConductorResult<()> {
        for task in self.graph.tasks() {
            self.store.put_task(task).await?;
        }
        Ok(())
    }
}

use crate::aggregate::{aggregate, Candidate, HybridResult};
use crate::executor::TaskExecutor;
use conductor_core::{AgentClass, ConductorError, ConductorResult, Task};
use std::sync::Arc;
use tracing::{info, warn};

/// Runs a task on both agent classes concurrently and merges the results.
///
/// Join policy: wait for both branches, tolerate partial failure — the
/// task succeeds if at least one branch produced a completed outcome and
/// fails only when both raised. Branches are not cancelled: a slower
/// losing branch runs to completion and its output is kept as an
/// alternative where the category merges them.
pub struct HybridExecutor {
    planner: Arc<dyn TaskExecutor>,
    builder: Arc<dyn TaskExecutor>,
}

impl HybridExecutor {
    pub fn new(planner: Arc<dyn TaskExecutor>, builder: Arc<dyn TaskExecutor>) -> Self {
        Self { planner, builder }
    }

    /// Execute the task on both classes and aggregate per its category.
    pub async fn execute(&self, task: &Task) -> ConductorResult<HybridResult> {
        info!(task_id = %task.id, category = %task.category, "Hybrid fan-out");

        let (planner_result, builder_result) =
            tokio::join!(self.planner.execute(task), self.builder.execute(task));

        let mut candidates = Vec::new();
        let mut branch_errors = Vec::new();

        for (class, result) in [
            (AgentClass::Planner, planner_result),
            (AgentClass::Builder, builder_result),
        ] {
            match result {
                Ok(outcome) if outcome.is_completed() => {
                    candidates.push(Candidate { class, outcome });
                }
                Ok(outcome) => {
                    let reason = outcome.error.unwrap_or_else(|| "unspecified failure".into());
                    warn!(task_id = %task.id, %class, %reason, "Hybrid branch failed");
                    branch_errors.push(format!("{class}: {reason}"));
                }
                Err(e) => {
                    warn!(task_id = %task.id, %class, error = %e, "Hybrid branch errored");
                    branch_errors.push(format!("{class}: {e}"));
                }
            }
        }

        if candidates.is_empty() {
            return Err(ConductorError::WorkerExecution(format!(
                "task {}: both hybrid branches failed ({})",
                task.id,
                branch_errors.join("; ")
            )));
        }

        Ok(aggregate(task.category, candidates))
    }
}

use crate::graph::TaskGraph;
use conductor_core::TaskId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// One terminal failure in the final summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedTask {
    pub task_id: TaskId,
    pub reason: String,
}

/// Final summary of a scheduler run.
///
/// Every task that ended failed appears here with its id and message;
/// nothing is swallowed between a worker's terminal write and this
/// report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed: Vec<FailedTask>,
    pub elapsed: Duration,
}

impl RunReport {
    /// Snapshot the terminal graph into a report.
    pub fn from_graph(graph: &TaskGraph, elapsed: Duration) -> Self {
        Self {
            total_tasks: graph.total_count(),
            completed_tasks: graph.completed_count(),
            failed: graph
                .failed_tasks()
                .into_iter()
                .map(|(task_id, reason)| FailedTask { task_id, reason })
                .collect(),
            elapsed,
        }
    }

    /// True when no task ended failed.
    pub fn success(&self) -> bool {
        self.failed.is_empty()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Run complete: {}/{} tasks completed, {} failed, in {:.1}s",
            self.completed_tasks,
            self.total_tasks,
            self.failed.len(),
            self.elapsed.as_secs_f64()
        )?;
        for failure in &self.failed {
            writeln!(f, "  FAILED {}: {}", failure.task_id, failure.reason)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use conductor_core::{AgentClass, Task, TaskCategory, TaskPriority, TaskSpec};

    fn graph_with_outcomes() -> TaskGraph {
        let tasks = ["t1", "t2", "t3"]
            .iter()
            .map(|id| {
                Task::from_spec(
                    TaskSpec {
                        id: (*id).into(),
                        description: "work".into(),
                        dependencies: vec![],
                        priority: TaskPriority::Normal,
                        category: TaskCategory::Testing,
                        multi_perspective: false,
                        estimated_tokens: None,
                    },
                    AgentClass::Builder,
                    false,
                )
            })
            .collect();
        let mut graph = TaskGraph::build(tasks).unwrap();
        graph.mark_completed(&"t1".into());
        graph.mark_completed(&"t2".into());
        graph.mark_failed(&"t3".into(), "handler exited with status 1");
        graph
    }

    #[test]
    fn test_report_counts_and_success() {
        let graph = graph_with_outcomes();
        let report = RunReport::from_graph(&graph, Duration::from_secs(4));
        assert_eq!(report.total_tasks, 3);
        assert_eq!(report.completed_tasks, 2);
        assert_eq!(report.failed.len(), 1);
        assert!(!report.success());
    }

    #[test]
    fn test_display_lists_every_failure() {
        let graph = graph_with_outcomes();
        let report = RunReport::from_graph(&graph, Duration::from_secs(4));
        let text = report.to_string();
        assert!(text.contains("2/3 tasks completed"));
        assert!(text.contains("FAILED t3: handler exited with status 1"));
    }
}

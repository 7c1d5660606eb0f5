use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Unique identifier of a task. Task ids are supplied by whoever defines
/// the task set, so this is a thin newtype over the given string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Create a new TaskId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// What kind of work a task is. A closed set: the router dispatches on
/// this, so a new category only exists once it has a routing rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    /// Produce or modify code.
    CodeGeneration,
    /// Review an artifact for quality and defects.
    Review,
    /// Investigate and report, without producing an artifact.
    Analysis,
    /// Write or update documentation.
    Documentation,
    /// Write or run tests.
    Testing,
    /// Improve an existing artifact against a measurable target.
    Optimization,
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskCategory::CodeGeneration => write!(f, "code_generation"),
            TaskCategory::Review => write!(f, "review"),
            TaskCategory::Analysis => write!(f, "analysis"),
            TaskCategory::Documentation => write!(f, "documentation"),
            TaskCategory::Testing => write!(f, "testing"),
            TaskCategory::Optimization => write!(f, "optimization"),
        }
    }
}

/// Urgency of a task. Lower rank schedules first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

impl TaskPriority {
    /// Numeric rank used for the scheduler's stable sort (lower = more
    /// urgent).
    pub fn rank(self) -> u8 {
        match self {
            TaskPriority::Critical => 0,
            TaskPriority::High => 1,
            TaskPriority::Normal => 2,
            TaskPriority::Low => 3,
        }
    }

    /// True for the priorities the router treats as urgent (rule 1).
    pub fn is_urgent(self) -> bool {
        matches!(self, TaskPriority::Critical | TaskPriority::High)
    }
}

/// Lifecycle status of a task.
///
/// `Ready` is transient: the scheduler marks a pending task ready once all
/// its dependencies completed, and either assigns it in the same pass or
/// reverts it to `Pending` (backpressure when no matching agent is idle).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Ready,
    InProgress,
    Completed,
    Failed { reason: String },
}

impl TaskStatus {
    /// True once the task can never change state again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed { .. })
    }
}

/// A task definition as supplied from outside, before routing.
///
/// The router turns a `TaskSpec` into a [`Task`] by deciding its agent
/// class and whether it runs hybrid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: TaskId,
    pub description: String,
    /// Ids of tasks that must complete before this one may start.
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub priority: TaskPriority,
    pub category: TaskCategory,
    /// Explicit request to gather multiple perspectives on a review.
    #[serde(default)]
    pub multi_perspective: bool,
    /// Estimated token footprint, as reported by the context manager.
    #[serde(default)]
    pub estimated_tokens: Option<u32>,
}

/// A routed unit of work tracked by the scheduler.
///
/// Only the scheduler mutates a task; workers report outcomes through
/// their own status record and never touch the task set directly. Once a
/// task reaches a terminal status it is never written again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Capability class of the agents allowed to take this task.
    pub agent_class: crate::agent::AgentClass,
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
    pub category: TaskCategory,
    /// Execute on both agent classes concurrently and aggregate.
    #[serde(default)]
    pub hybrid: bool,
    #[serde(default)]
    pub multi_perspective: bool,
    #[serde(default)]
    pub estimated_tokens: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Build a routed task from its spec.
    pub fn from_spec(spec: TaskSpec, agent_class: crate::agent::AgentClass, hybrid: bool) -> Self {
        Self {
            id: spec.id,
            agent_class,
            description: spec.description,
            dependencies: spec.dependencies,
            status: TaskStatus::Pending,
            priority: spec.priority,
            category: spec.category,
            hybrid,
            multi_perspective: spec.multi_perspective,
            estimated_tokens: spec.estimated_tokens,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// True when the task is pending and every dependency has completed.
    pub fn is_ready(&self, completed: &HashSet<TaskId>) -> bool {
        self.status == TaskStatus::Pending
            && self.dependencies.iter().all(|dep| completed.contains(dep))
    }

    /// True once the task is completed or failed.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::agent::AgentClass;

    fn spec(id: &str) -> TaskSpec {
        TaskSpec {
            id: id.into(),
            description: format!("task {id}"),
            dependencies: vec![],
            priority: TaskPriority::Normal,
            category: TaskCategory::CodeGeneration,
            multi_perspective: false,
            estimated_tokens: None,
        }
    }

    #[test]
    fn test_from_spec_starts_pending() {
        let task = Task::from_spec(spec("t1"), AgentClass::Builder, false);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.agent_class, AgentClass::Builder);
        assert!(task.started_at.is_none());
        assert!(task.completed_at.is_none());
    }

    #[test]
    fn test_is_ready_no_deps() {
        let task = Task::from_spec(spec("t1"), AgentClass::Builder, false);
        assert!(task.is_ready(&HashSet::new()));
    }

    #[test]
    fn test_is_ready_with_deps() {
        let mut s = spec("t2");
        s.dependencies = vec!["t1".into()];
        let task = Task::from_spec(s, AgentClass::Builder, false);

        assert!(!task.is_ready(&HashSet::new()));

        let completed: HashSet<TaskId> = [TaskId::from("t1")].into_iter().collect();
        assert!(task.is_ready(&completed));
    }

    #[test]
    fn test_not_ready_when_in_progress() {
        let mut task = Task::from_spec(spec("t1"), AgentClass::Builder, false);
        task.status = TaskStatus::InProgress;
        assert!(!task.is_ready(&HashSet::new()));
    }

    #[test]
    fn test_terminal_states() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed { reason: "x".into() }.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Ready.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_priority_rank_ordering() {
        assert!(TaskPriority::Critical.rank() < TaskPriority::High.rank());
        assert!(TaskPriority::High.rank() < TaskPriority::Normal.rank());
        assert!(TaskPriority::Normal.rank() < TaskPriority::Low.rank());
        assert!(TaskPriority::Critical.is_urgent());
        assert!(TaskPriority::High.is_urgent());
        assert!(!TaskPriority::Normal.is_urgent());
    }

    #[test]
    fn test_status_serialization() {
        let status = TaskStatus::Failed {
            reason: "timeout".to_string(),
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("timeout"));
        let parsed: TaskStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, status);
    }

    #[test]
    fn test_spec_deserialization_defaults() {
        let json = r#"{"id":"t1","description":"do it","category":"review"}"#;
        let spec: TaskSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.priority, TaskPriority::Normal);
        assert!(spec.dependencies.is_empty());
        assert!(!spec.multi_perspective);
        assert!(spec.estimated_tokens.is_none());
    }
}

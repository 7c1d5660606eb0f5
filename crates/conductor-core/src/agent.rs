use crate::task::{TaskCategory, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier of a worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Create a new AgentId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random AgentId.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Capability class of an agent.
///
/// Each class declares the task categories it can take; routing and
/// assignment go through [`AgentClass::supports`] rather than matching on
/// names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentClass {
    /// High-capability planning/review class. Larger context budget,
    /// more expensive per task.
    Planner,
    /// Implementation class. Cheaper, smaller context budget; the default
    /// destination for routine work.
    Builder,
}

impl AgentClass {
    /// The task categories this class is declared capable of.
    pub fn capabilities(self) -> &'static [TaskCategory] {
        match self {
            AgentClass::Planner => &[
                TaskCategory::CodeGeneration,
                TaskCategory::Review,
                TaskCategory::Analysis,
                TaskCategory::Documentation,
            ],
            AgentClass::Builder => &[
                TaskCategory::CodeGeneration,
                TaskCategory::Testing,
                TaskCategory::Optimization,
                TaskCategory::Documentation,
            ],
        }
    }

    /// Whether this class can take tasks of the given category.
    pub fn supports(self, category: TaskCategory) -> bool {
        self.capabilities().contains(&category)
    }

    /// The class an assignment must match for a given task class.
    pub fn matches(self, required: AgentClass) -> bool {
        self == required
    }
}

impl fmt::Display for AgentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentClass::Planner => write!(f, "planner"),
            AgentClass::Builder => write!(f, "builder"),
        }
    }
}

impl FromStr for AgentClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "planner" => Ok(AgentClass::Planner),
            "builder" => Ok(AgentClass::Builder),
            other => Err(format!("unknown agent class '{other}'")),
        }
    }
}

/// Status of a worker as written into its durable record.
///
/// `Completed` and `Failed` are transient-terminal: the worker writes them
/// when execution ends, and they stand until the scheduler reconciles the
/// outcome into the task graph and resets the record to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Busy,
    Completed,
    Failed,
}

impl AgentStatus {
    /// True for the states the scheduler must reconcile and reset.
    pub fn is_terminal(self) -> bool {
        matches!(self, AgentStatus::Completed | AgentStatus::Failed)
    }
}

/// The durable status record of one worker.
///
/// This record is the only channel between scheduler and worker, and its
/// fields have a strict ownership split: the scheduler writes the
/// assignment fields (`current_task_id`, the transition to `Busy`, the
/// reset back to `Idle`), the worker writes the progress and terminal
/// fields (`progress`, `errors`, `output_refs`, the transition to
/// `Completed`/`Failed`). Neither side trusts the other's in-process
/// memory; the last durable write is ground truth.
///
/// `version` implements optimistic concurrency: a put is rejected unless
/// it carries the version that was read, and each successful put bumps it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: AgentId,
    pub agent_class: AgentClass,
    pub status: AgentStatus,
    /// The task this agent is assigned to, if any. At most one at a time.
    pub current_task_id: Option<TaskId>,
    /// Execution progress in [0.0, 1.0], reported by the worker.
    pub progress: f64,
    pub last_updated: DateTime<Utc>,
    /// Errors accumulated during the current execution.
    #[serde(default)]
    pub errors: Vec<String>,
    /// References to outputs produced by the completed execution.
    #[serde(default)]
    pub output_refs: Vec<String>,
    /// Optimistic-concurrency version stamp.
    #[serde(default)]
    pub version: u64,
}

impl AgentRecord {
    /// A fresh idle record for a newly started worker.
    pub fn new(agent_id: AgentId, agent_class: AgentClass) -> Self {
        Self {
            agent_id,
            agent_class,
            status: AgentStatus::Idle,
            current_task_id: None,
            progress: 0.0,
            last_updated: Utc::now(),
            errors: Vec::new(),
            output_refs: Vec::new(),
            version: 0,
        }
    }

    /// Stamp the record as freshly written.
    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }
}

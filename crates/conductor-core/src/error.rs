use thiserror::Error;

/// Result alias used across the workspace.
pub type ConductorResult<T> = Result<T, ConductorError>;

/// Error taxonomy for the orchestration core.
///
/// Note that "no idle agent for a ready task" is deliberately absent: that
/// situation is backpressure, not an error, and the task simply stays
/// pending until a matching agent frees up.
#[derive(Error, Debug)]
pub enum ConductorError {
    /// The task graph contains a cycle. Fatal at graph load, before any
    /// task runs.
    #[error("Dependency cycle: {0}")]
    DependencyCycle(String),

    /// A circuit breaker rejected the call without invoking the wrapped
    /// operation.
    #[error("Circuit open for operation '{0}'")]
    CircuitOpen(String),

    /// A worker's execution of a task failed terminally.
    #[error("Worker execution failed: {0}")]
    WorkerExecution(String),

    /// A task's estimated footprint exceeds every agent class's context
    /// budget.
    #[error("Resource exhaustion: {0}")]
    ResourceExhaustion(String),

    /// The durable store could not serve a read or write.
    #[error("Store error: {0}")]
    Store(String),

    /// An optimistic-versioned write lost the race: the stored record
    /// changed since it was read.
    #[error("Version conflict: {0}")]
    VersionConflict(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Router error: {0}")]
    Router(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

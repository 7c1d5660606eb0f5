use async_trait::async_trait;
use conductor_core::{ConductorError, ConductorResult, Task};
use conductor_router::{ExecutionOutcome, TaskExecutor};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Executor that delegates the actual work to an external handler
/// process.
///
/// The handler receives the task as JSON on stdin and must print an
/// [`ExecutionOutcome`] as JSON on stdout. A non-zero exit or malformed
/// output is a failed outcome, not a crash of the worker. This is the
/// concrete shape of the "external collaborator" boundary used by the
/// CLI.
pub struct ProcessExecutor {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ProcessExecutor {
    /// An executor spawning `command` for each task.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            timeout: Duration::from_secs(300),
        }
    }

    /// Extra arguments passed to every invocation.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Per-invocation wall-clock limit.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl TaskExecutor for ProcessExecutor {
    async fn execute(&self, task: &Task) -> ConductorResult<ExecutionOutcome> {
        let payload = serde_json::to_vec(task)?;

        debug!(command = %self.command, task_id = %task.id, "Spawning handler");
        let mut child = tokio::process::Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ConductorError::WorkerExecution(format!(
                    "failed to spawn handler '{}': {e}",
                    self.command
                ))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&payload).await?;
            // close stdin so handlers that read to EOF can proceed
            drop(stdin);
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                ConductorError::WorkerExecution(format!(
                    "handler '{}' timed out after {}s on task {}",
                    self.command,
                    self.timeout.as_secs(),
                    task.id
                ))
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Ok(ExecutionOutcome::failed(format!(
                "handler exited with status {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        match serde_json::from_str::<ExecutionOutcome>(stdout.trim()) {
            Ok(outcome) => {
                info!(task_id = %task.id, completed = outcome.is_completed(), "Handler finished");
                Ok(outcome)
            }
            Err(e) => Ok(ExecutionOutcome::failed(format!(
                "handler produced invalid outcome JSON: {e}"
            ))),
        }
    }
}

//! `conductor` binary: start the scheduler or a worker against a shared
//! file store.

use clap::{Parser, Subcommand};
use conductor_core::{AgentClass, AgentId, FileStateStore, TaskSpec};
use conductor_resilience::ResilienceConfig;
use conductor_router::{Router, RouterConfig};
use conductor_scheduler::{Scheduler, SchedulerConfig, TaskGraph};
use conductor_worker::{ProcessExecutor, Worker, WorkerConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "conductor", about = "Conductor — multi-agent task orchestration core")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "conductor.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Route a task set and run the scheduling loop until every task is
    /// terminal
    Scheduler {
        /// Directory of the shared state store
        #[arg(long)]
        store: PathBuf,
        /// JSON file with the task definitions
        #[arg(long)]
        tasks: PathBuf,
        /// Poll interval override in milliseconds
        #[arg(long)]
        poll_interval_ms: Option<u64>,
    },
    /// Run a worker of the given class
    Worker {
        /// Directory of the shared state store
        #[arg(long)]
        store: PathBuf,
        /// Capability class of this worker (planner or builder)
        #[arg(long)]
        class: AgentClass,
        /// Stable worker id (generated when omitted)
        #[arg(long)]
        id: Option<String>,
        /// Handler command: receives the task as JSON on stdin, prints an
        /// outcome as JSON on stdout
        #[arg(long)]
        handler: String,
        /// Extra argument for the handler (repeatable)
        #[arg(long = "handler-arg")]
        handler_args: Vec<String>,
        /// Handler command for the other class, enabling hybrid fan-out
        #[arg(long)]
        hybrid_handler: Option<String>,
    },
}

#[derive(Deserialize, Default)]
struct ConductorConfig {
    #[serde(default)]
    scheduler: SchedulerSection,
    #[serde(default)]
    worker: WorkerSection,
    #[serde(default)]
    router: RouterConfig,
    #[serde(default)]
    resilience: ResilienceConfig,
}

#[derive(Deserialize)]
struct SchedulerSection {
    #[serde(default = "default_scheduler_poll_ms")]
    poll_interval_ms: u64,
    /// 0 disables staleness detection.
    #[serde(default = "default_stale_timeout_secs")]
    stale_timeout_secs: u64,
    #[serde(default = "default_lease_ttl_secs")]
    lease_ttl_secs: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_scheduler_poll_ms(),
            stale_timeout_secs: default_stale_timeout_secs(),
            lease_ttl_secs: default_lease_ttl_secs(),
        }
    }
}

impl SchedulerSection {
    fn to_config(&self, poll_override_ms: Option<u64>) -> SchedulerConfig {
        SchedulerConfig {
            poll_interval: Duration::from_millis(
                poll_override_ms.unwrap_or(self.poll_interval_ms),
            ),
            stale_timeout: match self.stale_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            lease_ttl: Duration::from_secs(self.lease_ttl_secs),
        }
    }
}

#[derive(Deserialize)]
struct WorkerSection {
    #[serde(default = "default_worker_poll_ms")]
    poll_interval_ms: u64,
    #[serde(default = "default_heartbeat_ms")]
    heartbeat_interval_ms: u64,
    #[serde(default = "default_handler_timeout_secs")]
    handler_timeout_secs: u64,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_worker_poll_ms(),
            heartbeat_interval_ms: default_heartbeat_ms(),
            handler_timeout_secs: default_handler_timeout_secs(),
        }
    }
}

impl WorkerSection {
    fn to_config(&self) -> WorkerConfig {
        WorkerConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
        }
    }
}

fn default_scheduler_poll_ms() -> u64 {
    2000
}
fn default_stale_timeout_secs() -> u64 {
    300
}
fn default_lease_ttl_secs() -> u64 {
    30
}
fn default_worker_poll_ms() -> u64 {
    1000
}
fn default_heartbeat_ms() -> u64 {
    2000
}
fn default_handler_timeout_secs() -> u64 {
    300
}

async fn load_config(path: &Path) -> anyhow::Result<ConductorConfig> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => Ok(toml::from_str(&raw)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "Config file not found, using defaults");
            Ok(ConductorConfig::default())
        }
        Err(e) => Err(anyhow::anyhow!(
            "Failed to read config file '{}': {e}",
            path.display()
        )),
    }
}

async fn load_task_specs(path: &Path) -> anyhow::Result<Vec<TaskSpec>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read task file '{}': {e}", path.display()))?;
    Ok(serde_json::from_str(&raw)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config).await?;

    match cli.command {
        Commands::Scheduler {
            store,
            tasks,
            poll_interval_ms,
        } => {
            let specs = load_task_specs(&tasks).await?;
            info!(count = specs.len(), "Loaded task definitions");

            let router = Router::new(config.router);
            let routed = router.route_all(specs)?;
            // cycles and broken dependencies are rejected here, before
            // anything runs
            let graph = TaskGraph::build(routed)?;

            let store = Arc::new(FileStateStore::new(store).await?);
            let mut scheduler = Scheduler::new(
                store,
                graph,
                config.scheduler.to_config(poll_interval_ms),
            );

            let report = scheduler.run().await?;
            print!("{report}");
            if !report.success() {
                std::process::exit(1);
            }
        }
        Commands::Worker {
            store,
            class,
            id,
            handler,
            handler_args,
            hybrid_handler,
        } => {
            let id = id.map_or_else(AgentId::generate, AgentId::new);
            let store = Arc::new(FileStateStore::new(store).await?);
            let timeout = Duration::from_secs(config.worker.handler_timeout_secs);

            let executor = Arc::new(
                ProcessExecutor::new(handler)
                    .with_args(handler_args)
                    .with_timeout(timeout),
            );

            let mut worker = Worker::new(id, class, store, executor)
                .with_config(config.worker.to_config())
                .with_resilience(&config.resilience);

            if let Some(command) = hybrid_handler {
                worker = worker
                    .with_hybrid_peer(Arc::new(ProcessExecutor::new(command).with_timeout(timeout)));
            }

            info!(agent_id = %worker.id(), %class, "Starting worker");
            worker.run().await?;
        }
    }

    Ok(())
}

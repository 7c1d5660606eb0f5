use crate::agent::{AgentId, AgentRecord};
use crate::error::{ConductorError, ConductorResult};
use crate::task::{Task, TaskId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// The scheduler's store-level leader lease.
///
/// Only one scheduler may run against a store. A scheduler acquires the
/// lease before its first pass, renews it every pass, and clears it on
/// clean shutdown; a second scheduler refuses to start while the lease is
/// younger than its TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerLease {
    /// Identity of the holding scheduler process.
    pub holder: String,
    pub renewed_at: DateTime<Utc>,
}

impl SchedulerLease {
    /// A lease held by `holder`, renewed now.
    pub fn held_by(holder: impl Into<String>) -> Self {
        Self {
            holder: holder.into(),
            renewed_at: Utc::now(),
        }
    }
}

/// Durable store shared by the scheduler and all workers.
///
/// The core is agnostic to the backing technology; the only requirements
/// are per-record atomic writes and the optimistic version check on agent
/// records: a `put_agent` whose `version` differs from the stored record's
/// is rejected with [`ConductorError::VersionConflict`], and a successful
/// put stores `version + 1`. Tasks are written by the scheduler alone, so
/// task writes are plain last-write-wins.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get_task(&self, id: &TaskId) -> ConductorResult<Option<Task>>;
    async fn put_task(&self, task: &Task) -> ConductorResult<()>;
    async fn list_tasks(&self) -> ConductorResult<Vec<Task>>;

    async fn get_agent(&self, id: &AgentId) -> ConductorResult<Option<AgentRecord>>;
    async fn put_agent(&self, record: &AgentRecord) -> ConductorResult<()>;
    async fn list_agents(&self) -> ConductorResult<Vec<AgentRecord>>;

    async fn get_lease(&self) -> ConductorResult<Option<SchedulerLease>>;
    async fn put_lease(&self, lease: &SchedulerLease) -> ConductorResult<()>;
    async fn clear_lease(&self) -> ConductorResult<()>;
}

fn bump_version(record: &AgentRecord) -> AgentRecord {
    let mut next = record.clone();
    next.version = record.version + 1;
    next
}

fn version_check(stored: Option<u64>, incoming: u64, id: &AgentId) -> ConductorResult<()> {
    match stored {
        Some(v) if v != incoming => Err(ConductorError::VersionConflict(format!(
            "agent {id}: stored version {v}, write carried {incoming}"
        ))),
        _ => Ok(()),
    }
}

/// File-based state store: one JSON file per record.
///
/// Layout: `<dir>/tasks/<id>.json`, `<dir>/agents/<id>.json`, and
/// `<dir>/scheduler.lease`. Every write lands in a temp file first and is
/// renamed into place, so readers in other processes never observe a
/// partial record.
pub struct FileStateStore {
    tasks_dir: PathBuf,
    agents_dir: PathBuf,
    lease_path: PathBuf,
}

impl FileStateStore {
    /// Open (creating directories as needed) a store rooted at `dir`.
    pub async fn new(dir: impl Into<PathBuf>) -> ConductorResult<Self> {
        let dir = dir.into();
        let tasks_dir = dir.join("tasks");
        let agents_dir = dir.join("agents");
        tokio::fs::create_dir_all(&tasks_dir).await?;
        tokio::fs::create_dir_all(&agents_dir).await?;
        Ok(Self {
            tasks_dir,
            agents_dir,
            lease_path: dir.join("scheduler.lease"),
        })
    }

    fn record_path(dir: &Path, id: &str) -> ConductorResult<PathBuf> {
        if id.is_empty() || id.chars().any(|c| std::path::is_separator(c) || c == '\0') {
            return Err(ConductorError::Store(format!(
                "id '{id}' is not usable as a record file name"
            )));
        }
        Ok(dir.join(format!("{id}.json")))
    }

    async fn write_atomic<T: Serialize>(path: &Path, value: &T) -> ConductorResult<()> {
        let json = serde_json::to_string_pretty(value)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> ConductorResult<Option<T>> {
        if !path.exists() {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(path).await?;
        let value = serde_json::from_str(&data)
            .map_err(|e| ConductorError::Store(format!("corrupt record {}: {e}", path.display())))?;
        Ok(Some(value))
    }

    async fn list_dir<T: for<'de> Deserialize<'de>>(dir: &Path) -> ConductorResult<Vec<T>> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(record) = Self::read_json(&path).await? {
                records.push(record);
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get_task(&self, id: &TaskId) -> ConductorResult<Option<Task>> {
        let path = Self::record_path(&self.tasks_dir, id.as_str())?;
        Self::read_json(&path).await
    }

    async fn put_task(&self, task: &Task) -> ConductorResult<()> {
        let path = Self::record_path(&self.tasks_dir, task.id.as_str())?;
        Self::write_atomic(&path, task).await
    }

    async fn list_tasks(&self) -> ConductorResult<Vec<Task>> {
        Self::list_dir(&self.tasks_dir).await
    }

    async fn get_agent(&self, id: &AgentId) -> ConductorResult<Option<AgentRecord>> {
        let path = Self::record_path(&self.agents_dir, id.as_str())?;
        Self::read_json(&path).await
    }

    async fn put_agent(&self, record: &AgentRecord) -> ConductorResult<()> {
        let path = Self::record_path(&self.agents_dir, record.agent_id.as_str())?;
        let stored: Option<AgentRecord> = Self::read_json(&path).await?;
        version_check(stored.map(|r| r.version), record.version, &record.agent_id)?;
        Self::write_atomic(&path, &bump_version(record)).await
    }

    async fn list_agents(&self) -> ConductorResult<Vec<AgentRecord>> {
        Self::list_dir(&self.agents_dir).await
    }

    async fn get_lease(&self) -> ConductorResult<Option<SchedulerLease>> {
        Self::read_json(&self.lease_path).await
    }

    async fn put_lease(&self, lease: &SchedulerLease) -> ConductorResult<()> {
        Self::write_atomic(&self.lease_path, lease).await
    }

    async fn clear_lease(&self) -> ConductorResult<()> {
        if self.lease_path.exists() {
            tokio::fs::remove_file(&self.lease_path).await?;
        }
        Ok(())
    }
}

/// In-memory state store with the same semantics as the file store.
/// The substitute used throughout the test suites.
#[derive(Default)]
pub struct MemoryStateStore {
    tasks: RwLock<HashMap<TaskId, Task>>,
    agents: RwLock<HashMap<AgentId, AgentRecord>>,
    lease: RwLock<Option<SchedulerLease>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get_task(&self, id: &TaskId) -> ConductorResult<Option<Task>> {
        Ok(self.tasks.read().await.get(id).cloned())
    }

    async fn put_task(&self, task: &Task) -> ConductorResult<()> {
        self.tasks.write().await.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn list_tasks(&self) -> ConductorResult<Vec<Task>> {
        Ok(self.tasks.read().await.values().cloned().collect())
    }

    async fn get_agent(&self, id: &AgentId) -> ConductorResult<Option<AgentRecord>> {
        Ok(self.agents.read().await.get(id).cloned())
    }

    async fn put_agent(&self, record: &AgentRecord) -> ConductorResult<()> {
        let mut agents = self.agents.write().await;
        let stored = agents.get(&record.agent_id).map(|r| r.version);
        version_check(stored, record.version, &record.agent_id)?;
        agents.insert(record.agent_id.clone(), bump_version(record));
        Ok(())
    }

    async fn list_agents(&self) -> ConductorResult<Vec<AgentRecord>> {
        Ok(self.agents.read().await.values().cloned().collect())
    }

    async fn get_lease(&self) -> ConductorResult<Option<SchedulerLease>> {
        Ok(self.lease.read().await.clone())
    }

    async fn put_lease(&self, lease: &SchedulerLease) -> ConductorResult<()> {
        *self.lease.write().await = Some(lease.clone());
        Ok(())
    }

    async fn clear_lease(&self) -> ConductorResult<()> {
        *self.lease.write().await = None;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::agent::{AgentClass, AgentStatus};
    use crate::task::{TaskCategory, TaskPriority, TaskSpec};

    fn sample_task(id: &str) -> Task {
        Task::from_spec(
            TaskSpec {
                id: id.into(),
                description: "sample".into(),
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

    async fn roundtrip(store: &dyn StateStore) {
        let task = sample_task("t1");
        store.put_task(&task).await.unwrap();
        let loaded = store.get_task(&"t1".into()).await.unwrap().unwrap();
        assert_eq!(loaded.description, "sample");

        let record = AgentRecord::new(AgentId::new("a1"), AgentClass::Builder);
        store.put_agent(&record).await.unwrap();
        let loaded = store.get_agent(&"a1".into()).await.unwrap().unwrap();
        assert_eq!(loaded.status, AgentStatus::Idle);
        assert_eq!(loaded.version, 1);

        assert_eq!(store.list_tasks().await.unwrap().len(), 1);
        assert_eq!(store.list_agents().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        roundtrip(&MemoryStateStore::new()).await;
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path()).await.unwrap();
        roundtrip(&store).await;
    }

    #[tokio::test]
    async fn test_version_conflict_rejected() {
        let store = MemoryStateStore::new();
        let record = AgentRecord::new(AgentId::new("a1"), AgentClass::Planner);
        store.put_agent(&record).await.unwrap(); // stored as v1

        // a write still carrying version 0 lost the race
        let stale = record.clone();
        let err = store.put_agent(&stale).await.unwrap_err();
        assert!(matches!(err, ConductorError::VersionConflict(_)));

        // re-reading and writing on top succeeds
        let fresh = store.get_agent(&"a1".into()).await.unwrap().unwrap();
        store.put_agent(&fresh).await.unwrap();
        let latest = store.get_agent(&"a1".into()).await.unwrap().unwrap();
        assert_eq!(latest.version, 2);
    }

    #[tokio::test]
    async fn test_file_store_version_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path()).await.unwrap();
        let record = AgentRecord::new(AgentId::new("a1"), AgentClass::Builder);
        store.put_agent(&record).await.unwrap();
        let err = store.put_agent(&record).await.unwrap_err();
        assert!(matches!(err, ConductorError::VersionConflict(_)));
    }

    #[tokio::test]
    async fn test_bad_id_rejected_as_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path()).await.unwrap();
        let task = sample_task("../escape");
        assert!(store.put_task(&task).await.is_err());
    }

    #[tokio::test]
    async fn test_lease_lifecycle() {
        let store = MemoryStateStore::new();
        assert!(store.get_lease().await.unwrap().is_none());

        store
            .put_lease(&SchedulerLease::held_by("sched-1"))
            .await
            .unwrap();
        let lease = store.get_lease().await.unwrap().unwrap();
        assert_eq!(lease.holder, "sched-1");

        store.clear_lease().await.unwrap();
        assert!(store.get_lease().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_records_are_none() {
        let store = MemoryStateStore::new();
        assert!(store.get_task(&"nope".into()).await.unwrap().is_none());
        assert!(store.get_agent(&"nope".into()).await.unwrap().is_none());
    }
}

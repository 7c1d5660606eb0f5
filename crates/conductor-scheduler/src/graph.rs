use chrono::Utc;
use conductor_core::{ConductorError, ConductorResult, Task, TaskId, TaskStatus};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// The scheduler's view of the whole task set, with dependency
/// resolution.
///
/// Construction validates the set: duplicate ids, dependencies on unknown
/// tasks, and dependency cycles are all rejected before anything runs.
/// Status transitions go through the `mark_*` methods and a terminal task
/// is never mutated again.
#[derive(Debug)]
pub struct TaskGraph {
    tasks: HashMap<TaskId, Task>,
    /// Insertion sequence, for stable priority ties.
    order: HashMap<TaskId, usize>,
    completed: HashSet<TaskId>,
}

impl TaskGraph {
    /// Validate and build a graph from routed tasks.
    pub fn build(tasks: Vec<Task>) -> ConductorResult<Self> {
        let mut map: HashMap<TaskId, Task> = HashMap::with_capacity(tasks.len());
        let mut order: HashMap<TaskId, usize> = HashMap::with_capacity(tasks.len());
        let mut sequence: Vec<TaskId> = Vec::with_capacity(tasks.len());

        for (index, task) in tasks.into_iter().enumerate() {
            if map.contains_key(&task.id) {
                return Err(ConductorError::Scheduler(format!(
                    "duplicate task id '{}'",
                    task.id
                )));
            }
            order.insert(task.id.clone(), index);
            sequence.push(task.id.clone());
            map.insert(task.id.clone(), task);
        }

        for task in map.values() {
            for dep in &task.dependencies {
                if !map.contains_key(dep) {
                    return Err(ConductorError::Scheduler(format!(
                        "task '{}' depends on unknown task '{dep}'",
                        task.id
                    )));
                }
            }
        }

        let graph = Self {
            completed: map
                .values()
                .filter(|t| t.status == TaskStatus::Completed)
                .map(|t| t.id.clone())
                .collect(),
            tasks: map,
            order,
        };
        graph.check_cycles(&sequence)?;
        Ok(graph)
    }

    /// Reject the graph if any dependency chain loops back on itself.
    fn check_cycles(&self, sequence: &[TaskId]) -> ConductorResult<()> {
        // 1 = on the current path, 2 = fully explored
        let mut marks: HashMap<&TaskId, u8> = HashMap::new();
        for id in sequence {
            self.dfs_cycle(id, &mut marks)?;
        }
        Ok(())
    }

    fn dfs_cycle<'a>(
        &'a self,
        id: &'a TaskId,
        marks: &mut HashMap<&'a TaskId, u8>,
    ) -> ConductorResult<()> {
        match marks.get(id) {
            Some(1) => {
                return Err(ConductorError::DependencyCycle(format!(
                    "task '{id}' is part of a dependency cycle"
                )))
            }
            Some(2) => return Ok(()),
            _ => {}
        }
        marks.insert(id, 1);
        if let Some(task) = self.tasks.get(id) {
            for dep in &task.dependencies {
                self.dfs_cycle(dep, marks)?;
            }
        }
        marks.insert(id, 2);
        Ok(())
    }

    /// Ids of every pending task whose dependencies have all completed,
    /// most urgent first, insertion order breaking ties.
    pub fn ready_ids(&self) -> Vec<TaskId> {
        let mut ready: Vec<&Task> = self
            .tasks
            .values()
            .filter(|t| t.is_ready(&self.completed))
            .collect();
        ready.sort_by_key(|t| (t.priority.rank(), self.order.get(&t.id).copied()));
        ready.into_iter().map(|t| t.id.clone()).collect()
    }

    /// Get a task by id.
    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// All tasks in insertion order.
    pub fn tasks(&self) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self.tasks.values().collect();
        tasks.sort_by_key(|t| self.order.get(&t.id).copied());
        tasks
    }

    /// Mark a pending task ready for this scheduling pass.
    pub fn mark_ready(&mut self, id: &TaskId) {
        if let Some(task) = self.tasks.get_mut(id) {
            if task.status == TaskStatus::Pending {
                task.status = TaskStatus::Ready;
            }
        }
    }

    /// Revert every still-unassigned ready task to pending (backpressure).
    pub fn revert_unassigned(&mut self) {
        for task in self.tasks.values_mut() {
            if task.status == TaskStatus::Ready {
                task.status = TaskStatus::Pending;
            }
        }
    }

    /// Transition an assigned task to in-progress and stamp its start.
    pub fn mark_in_progress(&mut self, id: &TaskId) {
        if let Some(task) = self.tasks.get_mut(id) {
            if !task.is_terminal() {
                task.status = TaskStatus::InProgress;
                task.started_at = Some(Utc::now());
            }
        }
    }

    /// Mark a task completed. No-op if the task is already terminal.
    pub fn mark_completed(&mut self, id: &TaskId) {
        if let Some(task) = self.tasks.get_mut(id) {
            if task.is_terminal() {
                debug!(task_id = %id, "Ignoring completion of terminal task");
                return;
            }
            task.status = TaskStatus::Completed;
            task.completed_at = Some(Utc::now());
            self.completed.insert(id.clone());
        }
    }

    /// Mark a task failed. No-op if the task is already terminal.
    pub fn mark_failed(&mut self, id: &TaskId, reason: impl Into<String>) {
        if let Some(task) = self.tasks.get_mut(id) {
            if task.is_terminal() {
                debug!(task_id = %id, "Ignoring failure of terminal task");
                return;
            }
            task.status = TaskStatus::Failed {
                reason: reason.into(),
            };
            task.completed_at = Some(Utc::now());
        }
    }

    /// True once every task is completed or failed.
    pub fn is_done(&self) -> bool {
        self.tasks.values().all(Task::is_terminal)
    }

    /// Every failed task with its reason, in insertion order.
    pub fn failed_tasks(&self) -> Vec<(TaskId, String)> {
        self.tasks()
            .into_iter()
            .filter_map(|t| match &t.status {
                TaskStatus::Failed { reason } => Some((t.id.clone(), reason.clone())),
                _ => None,
            })
            .collect()
    }

    /// Number of completed tasks.
    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    /// Total number of tasks.
    pub fn total_count(&self) -> usize {
        self.tasks.len()
    }
}

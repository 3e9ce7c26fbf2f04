//! A task queue with dependency resolution and a strict state machine.
//!
//! Tasks are registered once, never deleted, and only move through
//! Pending → InProgress → {Completed, Failed}. Readiness is a pure query:
//! a Pending task whose dependencies are all Completed. A dependency id
//! that was never registered leaves its dependents permanently blocked;
//! they are reported in the summary's `blocked` bucket rather than
//! silently dropped.

use crate::types::{QueueSummary, Task, TaskStatus};
use chrono::Utc;
use muster_core::{MusterError, MusterResult};
use std::collections::{HashMap, HashSet};

/// Dependency-graph task queue for one execution run.
pub struct TaskQueue {
    tasks: HashMap<String, Task>,
    insertion: Vec<String>,
    completed: HashSet<String>,
}

impl TaskQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            insertion: Vec::new(),
            completed: HashSet::new(),
        }
    }

    /// Registers a Pending task. Rejects an id that already exists.
    pub fn add_task(&mut self, task: Task) -> MusterResult<()> {
        if self.tasks.contains_key(&task.id) {
            return Err(MusterError::DuplicateTask(task.id));
        }
        self.insertion.push(task.id.clone());
        self.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    /// Returns every ready task in registration order.
    ///
    /// Ready means Pending with all dependencies Completed. Failed
    /// dependencies never count as satisfied.
    pub fn get_ready_tasks(&self) -> Vec<&Task> {
        self.insertion
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .filter(|task| task.is_ready(&self.completed))
            .collect()
    }

    /// Moves a Pending task to InProgress and records the worker and
    /// start time.
    pub fn mark_in_progress(&mut self, id: &str, worker: &str) -> MusterResult<()> {
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| MusterError::UnknownTask(id.to_string()))?;
        if task.status != TaskStatus::Pending {
            return Err(MusterError::InvalidTransition {
                task_id: id.to_string(),
                reason: format!("expected pending, found {}", task.status),
            });
        }
        task.status = TaskStatus::InProgress;
        task.assigned_worker = Some(worker.to_string());
        task.started_at = Some(Utc::now());
        Ok(())
    }

    /// Moves an InProgress task to Completed and records its result.
    pub fn mark_complete(&mut self, id: &str, result: impl Into<String>) -> MusterResult<()> {
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| MusterError::UnknownTask(id.to_string()))?;
        if task.status != TaskStatus::InProgress {
            return Err(MusterError::InvalidTransition {
                task_id: id.to_string(),
                reason: format!("expected in_progress, found {}", task.status),
            });
        }
        task.status = TaskStatus::Completed;
        task.result = Some(result.into());
        task.completed_at = Some(Utc::now());
        self.completed.insert(id.to_string());
        Ok(())
    }

    /// Moves an InProgress task to Failed and records its error.
    pub fn mark_failed(&mut self, id: &str, error: impl Into<String>) -> MusterResult<()> {
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| MusterError::UnknownTask(id.to_string()))?;
        if task.status != TaskStatus::InProgress {
            return Err(MusterError::InvalidTransition {
                task_id: id.to_string(),
                reason: format!("expected in_progress, found {}", task.status),
            });
        }
        task.status = TaskStatus::Failed;
        task.error = Some(error.into());
        task.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Whether every task is Completed. Failed tasks block completion.
    /// Vacuously true for an empty queue.
    pub fn is_complete(&self) -> bool {
        self.tasks
            .values()
            .all(|task| task.status == TaskStatus::Completed)
    }

    /// Whether any task has Failed.
    pub fn has_failures(&self) -> bool {
        self.tasks
            .values()
            .any(|task| task.status == TaskStatus::Failed)
    }

    /// Looks up a task by id.
    pub fn get_task(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// All tasks in registration order.
    pub fn get_all_tasks(&self) -> Vec<&Task> {
        self.insertion
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .collect()
    }

    /// Number of registered tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the queue holds no tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Number of tasks currently InProgress.
    pub fn in_progress_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|task| task.status == TaskStatus::InProgress)
            .count()
    }

    /// Aggregate counts by state. Pending tasks whose dependency ids were
    /// never registered land in `blocked` instead of `pending`; the
    /// buckets always sum to `total`.
    pub fn get_status_summary(&self) -> QueueSummary {
        let mut summary = QueueSummary {
            total: self.tasks.len(),
            ..QueueSummary::default()
        };
        for task in self.tasks.values() {
            match task.status {
                TaskStatus::Pending => {
                    let unresolved = task
                        .dependencies
                        .iter()
                        .any(|dep| !self.tasks.contains_key(dep));
                    if unresolved {
                        summary.blocked += 1;
                    } else {
                        summary.pending += 1;
                    }
                }
                TaskStatus::InProgress => summary.in_progress += 1,
                TaskStatus::Completed => summary.completed += 1,
                TaskStatus::Failed => summary.failed += 1,
            }
        }
        summary
    }

    /// Whether the dependency graph contains a cycle. Used as a deadlock
    /// diagnostic; a cycle keeps its members Pending forever.
    pub fn has_cycle(&self) -> bool {
        let mut visited: HashMap<&str, u8> = HashMap::new();
        for id in self.tasks.keys() {
            if self.dfs_cycle(id, &mut visited) {
                return true;
            }
        }
        false
    }

    fn dfs_cycle<'a>(&'a self, id: &'a str, visited: &mut HashMap<&'a str, u8>) -> bool {
        match visited.get(id) {
            Some(1) => return true,  // back edge = cycle
            Some(2) => return false, // already processed
            _ => {}
        }
        visited.insert(id, 1);
        if let Some(task) = self.tasks.get(id) {
            for dep in &task.dependencies {
                if self.dfs_cycle(dep, visited) {
                    return true;
                }
            }
        }
        visited.insert(id, 2);
        false
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

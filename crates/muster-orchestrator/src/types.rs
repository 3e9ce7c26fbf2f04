//! Shared types for the execution engine: tasks, workers, and the
//! serializable snapshots handed to collaborators.

use chrono::{DateTime, Utc};
use muster_core::WorkerDefinition;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// --- Task types ---

/// Lifecycle state of a task.
///
/// The only legal transitions are Pending → InProgress → Completed or
/// Pending → InProgress → Failed. Terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Registered, waiting for its dependencies.
    Pending,
    /// Assigned to a worker and dispatched.
    InProgress,
    /// Finished successfully.
    Completed,
    /// Finished with an error. Never satisfies a dependent's prerequisite.
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{label}")
    }
}

/// A subtask descriptor produced by the decompose capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Unique id within one decomposition result.
    pub task_id: String,
    /// Human-readable description handed to the execute capability.
    pub description: String,
    /// Ids of tasks that must complete first.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Capability tags a worker should offer for this task. Empty means
    /// any available worker qualifies.
    #[serde(default)]
    pub required_capabilities: Vec<String>,
}

impl TaskSpec {
    /// Creates a spec with no dependencies and no capability requirements.
    pub fn new(task_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            description: description.into(),
            dependencies: Vec::new(),
            required_capabilities: Vec::new(),
        }
    }

    /// Sets the dependency list.
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Sets the required capability tags.
    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.required_capabilities = capabilities;
        self
    }
}

/// A unit of work tracked by the queue for the life of the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Caller-supplied unique id.
    pub id: String,
    /// What this task is about.
    pub description: String,
    /// Ids of tasks that must be Completed before this one is ready.
    pub dependencies: Vec<String>,
    /// Capability tags a worker should offer. Empty means unconstrained.
    pub required_capabilities: Vec<String>,
    /// Current lifecycle state.
    pub status: TaskStatus,
    /// Name of the worker this task was assigned to, once in progress.
    pub assigned_worker: Option<String>,
    /// Output reported by the execute capability on success.
    pub result: Option<String>,
    /// Error reported by the execute capability on failure.
    pub error: Option<String>,
    /// When the task was registered.
    pub created_at: DateTime<Utc>,
    /// When the task was dispatched.
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Creates a Pending task with no dependencies.
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            dependencies: Vec::new(),
            required_capabilities: Vec::new(),
            status: TaskStatus::Pending,
            assigned_worker: None,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Sets the dependency list.
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Sets the required capability tags.
    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.required_capabilities = capabilities;
        self
    }

    /// Whether this task is ready: Pending with every dependency completed.
    pub fn is_ready(&self, completed: &HashSet<String>) -> bool {
        self.status == TaskStatus::Pending
            && self.dependencies.iter().all(|dep| completed.contains(dep))
    }
}

// --- Worker types ---

/// A worker slot in the pool: static definition plus run-time bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInstance {
    /// Worker name; doubles as the opaque handle passed to execute.
    pub name: String,
    /// Declared capability tags.
    pub capabilities: Vec<String>,
    /// Declared phase affinities (contextual metadata only).
    pub phase_affinity: Vec<String>,
    /// Id of the task currently assigned, if any. At most one.
    pub current_task: Option<String>,
    /// Number of tasks this worker finished successfully.
    pub tasks_completed: u64,
    /// Number of tasks this worker failed.
    pub tasks_failed: u64,
}

impl AgentInstance {
    /// Builds an idle instance from a roster entry.
    pub fn from_definition(definition: &WorkerDefinition) -> Self {
        Self {
            name: definition.name.clone(),
            capabilities: definition.capabilities.clone(),
            phase_affinity: definition.phase_affinity.clone(),
            current_task: None,
            tasks_completed: 0,
            tasks_failed: 0,
        }
    }

    /// Whether this worker has no active assignment.
    pub fn is_available(&self) -> bool {
        self.current_task.is_none()
    }

    /// Success ratio used as the selection tie-break.
    ///
    /// The +1 in the denominator keeps fresh workers from scoring a
    /// perfect 1.0 before they have any history.
    pub fn success_ratio(&self) -> f64 {
        self.tasks_completed as f64 / (self.tasks_completed + self.tasks_failed + 1) as f64
    }

    /// Number of declared capabilities matching the given requirements.
    pub fn capability_overlap(&self, required: &[String]) -> usize {
        required
            .iter()
            .filter(|cap| self.capabilities.contains(cap))
            .count()
    }
}

// --- Snapshot types ---

/// Aggregate task counts by state. Counts always sum to `total`;
/// `blocked` holds Pending tasks whose dependency ids are not in the
/// queue and therefore can never become ready.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSummary {
    /// Number of registered tasks.
    pub total: usize,
    /// Pending tasks that could still become ready.
    pub pending: usize,
    /// Tasks currently dispatched.
    pub in_progress: usize,
    /// Tasks finished successfully.
    pub completed: usize,
    /// Tasks finished with an error.
    pub failed: usize,
    /// Pending tasks referencing unknown dependency ids.
    pub blocked: usize,
}

/// Aggregate worker counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    /// Roster size.
    pub total_agents: usize,
    /// Workers with no active assignment.
    pub available_agents: usize,
    /// Workers holding an assignment.
    pub busy_agents: usize,
}

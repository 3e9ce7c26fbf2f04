//! Performance event sink.
//!
//! The executor reports one event per finished task. Where those events
//! go (a metrics database, a dashboard, a log file) is a collaborator
//! concern behind the [`PerformanceRecorder`] trait. The engine ships an
//! in-memory recorder for tests and small deployments and a null
//! recorder that drops everything.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One finished task execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceEvent {
    /// Run this task belonged to.
    pub run_id: Uuid,
    /// Worker that executed the task.
    pub worker: String,
    /// Task id.
    pub task_id: String,
    /// Phase label of the run.
    pub phase: String,
    /// Whether the execution succeeded.
    pub success: bool,
    /// Wall-clock execution time.
    pub duration_seconds: f64,
    /// Cost attributed to this execution, when a collaborator tracks it.
    pub cost: Option<f64>,
    /// When the event was emitted.
    pub recorded_at: DateTime<Utc>,
}

/// Sink for per-task performance events.
///
/// Implementations must tolerate being called from an async context and
/// synchronize internally; the executor shares one recorder across runs.
#[async_trait]
pub trait PerformanceRecorder: Send + Sync {
    /// Accepts one event. Must not fail the run: implementations handle
    /// their own delivery problems.
    async fn record(&self, event: PerformanceEvent);
}

/// Keeps every event in memory.
#[derive(Default)]
pub struct InMemoryRecorder {
    events: Mutex<Vec<PerformanceEvent>>,
}

impl InMemoryRecorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of everything recorded so far, in arrival order.
    pub fn events(&self) -> Vec<PerformanceEvent> {
        self.events.lock().clone()
    }

    /// Number of events recorded so far.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

#[async_trait]
impl PerformanceRecorder for InMemoryRecorder {
    async fn record(&self, event: PerformanceEvent) {
        self.events.lock().push(event);
    }
}

/// Drops every event. The executor's default sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRecorder;

#[async_trait]
impl PerformanceRecorder for NullRecorder {
    async fn record(&self, _event: PerformanceEvent) {}
}

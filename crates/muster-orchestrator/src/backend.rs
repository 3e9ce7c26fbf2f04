//! The capability boundary between the engine and whatever actually
//! plans and performs work.

use crate::types::TaskSpec;
use async_trait::async_trait;
use muster_core::MusterResult;

/// Trait for decompose/execute strategies.
///
/// The engine is agnostic about how objectives are split into subtasks
/// and how a subtask gets done (an LLM call, a subprocess, a human).
/// Implementations are pluggable strategies, not a hierarchy.
///
/// To add a new strategy:
/// 1. Implement `ExecutionBackend` for your struct
/// 2. Hand it to `MultiAgentExecutor::new` as an `Arc<dyn ExecutionBackend>`
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Splits an objective into subtask descriptors.
    ///
    /// Ids must be unique within the result; the executor rejects the
    /// whole decomposition otherwise. Dependencies may reference any id
    /// in the result.
    async fn decompose(&self, objective: &str) -> MusterResult<Vec<TaskSpec>>;

    /// Performs one task on behalf of the named worker.
    ///
    /// May be slow; the engine imposes no timeout. `Ok` carries the task
    /// output. `Err` means the task failed; the run records the failure
    /// and moves on, it never retries.
    async fn execute(&self, task_id: &str, description: &str, worker: &str)
        -> MusterResult<String>;
}

//! Core types and error definitions for the muster execution engine.
//!
//! This crate provides the foundation shared across muster crates:
//! the unified error type and the TOML-backed configuration schema
//! (worker roster, executor limits, convergence thresholds).
//!
//! # Main types
//!
//! - [`MusterError`] — Unified error enum for all muster subsystems.
//! - [`MusterResult`] — Convenience alias for `Result<T, MusterError>`.
//! - [`MusterConfig`] — Top-level configuration: roster + limits.
//! - [`WorkerDefinition`] — A single worker roster entry.

/// Configuration schema: worker roster, executor limits, monitor thresholds.
pub mod config;

pub use config::{ExecutorConfig, MonitorConfig, MusterConfig, WorkerDefinition};

// --- Error types ---

/// Top-level error type for the muster engine.
///
/// Backends raise [`MusterError::Execution`] for a failing task; the
/// executor converts it into run state rather than propagating it, so
/// only definitional errors (bad registrations, bad transitions, bad
/// configuration) escape a run.
#[derive(Debug, thiserror::Error)]
pub enum MusterError {
    /// A task was registered under an id that already exists in the queue.
    #[error("Duplicate task id: {0}")]
    DuplicateTask(String),

    /// A task id was not present in the queue.
    #[error("Unknown task id: {0}")]
    UnknownTask(String),

    /// A task state transition was requested out of order.
    #[error("Invalid transition for task '{task_id}': {reason}")]
    InvalidTransition {
        /// Id of the task whose transition was rejected.
        task_id: String,
        /// What was expected versus what was found.
        reason: String,
    },

    /// A worker name was not present in the pool roster.
    #[error("Unknown worker: {0}")]
    UnknownWorker(String),

    /// A worker already holds an active assignment.
    #[error("Worker '{worker}' is already assigned task '{task_id}'")]
    WorkerBusy {
        /// Name of the busy worker.
        worker: String,
        /// Id of the task it currently holds.
        task_id: String,
    },

    /// The decompose capability failed before any task was scheduled.
    #[error("Decompose error: {0}")]
    Decompose(String),

    /// A backend reported that a dispatched task failed.
    #[error("Task execution failed: {0}")]
    Execution(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A TOML parse error while loading configuration.
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`MusterError`].
pub type MusterResult<T> = Result<T, MusterError>;

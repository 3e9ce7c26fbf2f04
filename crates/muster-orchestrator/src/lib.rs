//! Multi-agent execution engine with dependency-aware scheduling and
//! convergence monitoring.
//!
//! Decomposes an objective into subtasks through a pluggable backend,
//! schedules the subtasks as their dependencies complete, dispatches
//! batches to capability-matched workers under a concurrency bound, and
//! reports a run verdict. A quality monitor watches coverage progression
//! and repeated outputs so callers can stop runs that stopped improving.
//!
//! # Main types
//!
//! - [`MultiAgentExecutor`] — Top-level engine that decomposes and executes a project run.
//! - [`TaskQueue`] — Dependency-aware task registry with strict state transitions.
//! - [`AgentPool`] — Fixed worker roster with deterministic capability matching.
//! - [`QualityMonitor`] — Convergence and output-loop detection across iterations.
//! - [`ExecutionBackend`] — Seam for plugging in decomposition and task execution.

/// Decomposition and execution seam.
pub mod backend;
/// Project run engine and batch dispatch.
pub mod executor;
/// Performance event recording.
pub mod metrics;
/// Worker roster and capability matching.
pub mod pool;
/// Convergence and loop detection.
pub mod quality;
/// Dependency-aware task registry.
pub mod task_queue;
/// Shared orchestration types (Task, TaskStatus, AgentInstance, etc.).
pub mod types;

pub use backend::ExecutionBackend;
pub use executor::{ExecutionReport, MultiAgentExecutor, ProgressSnapshot, RunStatus, TaskBrief};
pub use metrics::{InMemoryRecorder, NullRecorder, PerformanceEvent, PerformanceRecorder};
pub use pool::AgentPool;
pub use quality::{IterationRecord, QualityMetrics, QualityMonitor, Trend};
pub use task_queue::TaskQueue;
pub use types::{AgentInstance, PoolStatus, QueueSummary, Task, TaskSpec, TaskStatus};

//! The executor: drives a project run from decomposition to a terminal
//! verdict.
//!
//! One control loop advances scheduling passes sequentially. Within a
//! pass, ready tasks are paired with workers, marked in progress, and
//! dispatched as a batch of at most `max_parallel` concurrent execute
//! calls under a counting semaphore. All queue, pool, and monitor
//! mutation happens in the control loop, either before dispatch or
//! after the whole batch resolves, so no lock guards the run state.

use crate::backend::ExecutionBackend;
use crate::metrics::{NullRecorder, PerformanceEvent, PerformanceRecorder};
use crate::pool::AgentPool;
use crate::quality::{QualityMetrics, QualityMonitor};
use crate::task_queue::TaskQueue;
use crate::types::{PoolStatus, QueueSummary, Task, TaskStatus};
use chrono::Utc;
use futures_util::future::join_all;
use muster_core::{ExecutorConfig, MusterConfig, MusterResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Terminal verdict of a project run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Every task completed.
    Completed,
    /// The run stopped with work left: deadlock, stall, iteration
    /// budget, failed tasks, or a convergence halt.
    Incomplete,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Incomplete => write!(f, "incomplete"),
        }
    }
}

/// Summary returned by [`MultiAgentExecutor::execute_project`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Id minted for this run; tags every log line and recorder event.
    pub run_id: Uuid,
    /// The objective the run was asked to accomplish.
    pub objective: String,
    /// Number of tasks produced by decomposition.
    pub tasks_total: usize,
    /// Tasks that finished successfully.
    pub tasks_completed: usize,
    /// Tasks that finished with an error.
    pub tasks_failed: usize,
    /// Scheduling passes spent.
    pub iterations: usize,
    /// Wall-clock duration of the run.
    pub duration_seconds: f64,
    /// Terminal verdict.
    pub status: RunStatus,
}

/// One task's display row inside a progress snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskBrief {
    /// Task id.
    pub id: String,
    /// Task description.
    pub description: String,
    /// Current state.
    pub status: TaskStatus,
    /// Assigned worker, if dispatched.
    pub assigned_worker: Option<String>,
}

/// Combined queue + pool view for display layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Task counts by state.
    pub queue: QueueSummary,
    /// Worker counts.
    pub agent_pool: PoolStatus,
    /// Per-task rows in registration order.
    pub tasks_in_queue: Vec<TaskBrief>,
}

struct BatchItem {
    task_id: String,
    description: String,
    worker: String,
}

struct BatchResult {
    task_id: String,
    worker: String,
    outcome: MusterResult<String>,
    duration_seconds: f64,
}

/// Coordinates one project run: decomposition, scheduling, bounded
/// concurrent execution, and reporting.
///
/// Owns a fresh queue, pool, and monitor per instance; nothing leaks
/// across runs except through the recorder sink.
pub struct MultiAgentExecutor {
    backend: Arc<dyn ExecutionBackend>,
    recorder: Arc<dyn PerformanceRecorder>,
    queue: TaskQueue,
    pool: AgentPool,
    monitor: QualityMonitor,
    config: ExecutorConfig,
}

impl MultiAgentExecutor {
    /// Creates an executor from a backend and a full configuration.
    pub fn new(backend: Arc<dyn ExecutionBackend>, config: MusterConfig) -> Self {
        Self {
            backend,
            recorder: Arc::new(NullRecorder),
            queue: TaskQueue::new(),
            pool: AgentPool::new(&config.workers),
            monitor: QualityMonitor::new(config.monitor),
            config: config.executor,
        }
    }

    /// Replaces the default null recorder with an external sink.
    pub fn with_recorder(mut self, recorder: Arc<dyn PerformanceRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    /// Read access to the task queue.
    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Read access to the worker pool.
    pub fn pool(&self) -> &AgentPool {
        &self.pool
    }

    /// Snapshot of the convergence monitor.
    pub fn quality_metrics(&self) -> QualityMetrics {
        self.monitor.get_quality_metrics()
    }

    /// Runs the full project: decompose, schedule, execute, report.
    ///
    /// Only definitional problems (a failing decomposition, duplicate
    /// task ids, inconsistent bookkeeping) surface as `Err`. Execution
    /// failures, deadlock, and budget exhaustion all land in the report
    /// with status [`RunStatus::Incomplete`].
    pub async fn execute_project(&mut self, objective: &str) -> MusterResult<ExecutionReport> {
        let run_id = Uuid::new_v4();
        let start = Instant::now();

        info!(run_id = %run_id, objective = %objective, "Executor: starting project run");

        // Step 1: decompose the objective into subtasks
        let specs = self.backend.decompose(objective).await?;
        info!(
            run_id = %run_id,
            subtask_count = specs.len(),
            "Executor: decomposition complete"
        );

        // Step 2: register subtasks with their dependencies
        for spec in specs {
            let task = Task::new(spec.task_id, spec.description)
                .with_dependencies(spec.dependencies)
                .with_capabilities(spec.required_capabilities);
            self.queue.add_task(task)?;
        }
        if self.queue.has_cycle() {
            // the loop below will surface this as a deadlock
            warn!(run_id = %run_id, "Executor: dependency cycle in decomposition");
        }

        // Step 3: scheduling passes
        let mut iterations = 0;
        while !self.queue.is_complete() && iterations < self.config.max_iterations {
            iterations += 1;

            let ready: Vec<(String, String, Vec<String>)> = self
                .queue
                .get_ready_tasks()
                .iter()
                .map(|task| {
                    (
                        task.id.clone(),
                        task.description.clone(),
                        task.required_capabilities.clone(),
                    )
                })
                .collect();

            if ready.is_empty() {
                if self.queue.in_progress_count() == 0 && !self.queue.is_complete() {
                    warn!(
                        run_id = %run_id,
                        iteration = iterations,
                        cycle = self.queue.has_cycle(),
                        "Executor: deadlock — no task ready, none in progress, queue incomplete"
                    );
                    break;
                }
                continue;
            }

            // Pair ready tasks with workers until the batch holds
            // max_parallel assignments. Assignment and the
            // Pending→InProgress transition happen here, before anything
            // is dispatched. A task with no qualified worker is passed
            // over; later ready tasks can still fill the batch.
            let mut batch = Vec::new();
            for (task_id, description, required) in ready {
                if batch.len() == self.config.max_parallel
                    || self.pool.get_available_agents().is_empty()
                {
                    break;
                }
                let worker = match self.pool.find_best_agent(&required, Some(&self.config.phase)) {
                    Some(agent) => agent.name.clone(),
                    None => {
                        debug!(
                            run_id = %run_id,
                            task_id = %task_id,
                            "Executor: no qualified worker available"
                        );
                        continue;
                    }
                };
                self.pool.assign_task_to_agent(&task_id, &worker)?;
                self.queue.mark_in_progress(&task_id, &worker)?;
                batch.push(BatchItem {
                    task_id,
                    description,
                    worker,
                });
            }

            if batch.is_empty() {
                // The roster is static, so a pass where no ready task finds
                // a qualified worker can never resolve on a later pass.
                warn!(
                    run_id = %run_id,
                    iteration = iterations,
                    "Executor: stall — ready tasks but no qualified worker"
                );
                break;
            }

            info!(
                run_id = %run_id,
                iteration = iterations,
                batch_size = batch.len(),
                phase = %self.config.phase,
                "Executor: dispatching batch"
            );

            let results = self.run_batch(batch).await;
            let completed_this_pass = self.apply_batch(run_id, results).await?;

            // Feed the monitor with completion percentage as the coverage
            // proxy, then honor its verdict if configured to.
            let summary = self.queue.get_status_summary();
            let progress = if summary.total == 0 {
                100.0
            } else {
                summary.completed as f64 * 100.0 / summary.total as f64
            };
            self.monitor
                .record_iteration(iterations, Some(progress), None, completed_this_pass);

            if self.config.halt_on_convergence {
                let (keep_going, reason) = self.monitor.should_continue(iterations);
                if !keep_going {
                    warn!(
                        run_id = %run_id,
                        iteration = iterations,
                        reason = %reason,
                        "Executor: convergence halt"
                    );
                    break;
                }
            }
        }

        // Step 4: report
        let summary = self.queue.get_status_summary();
        let status = if self.queue.is_complete() {
            RunStatus::Completed
        } else {
            RunStatus::Incomplete
        };
        let report = ExecutionReport {
            run_id,
            objective: objective.to_string(),
            tasks_total: summary.total,
            tasks_completed: summary.completed,
            tasks_failed: summary.failed,
            iterations,
            duration_seconds: start.elapsed().as_secs_f64(),
            status,
        };

        info!(
            run_id = %run_id,
            status = %report.status,
            tasks_completed = report.tasks_completed,
            tasks_failed = report.tasks_failed,
            iterations = report.iterations,
            "Executor: run finished"
        );

        Ok(report)
    }

    /// Current queue + pool view for display layers.
    pub fn get_progress(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            queue: self.queue.get_status_summary(),
            agent_pool: self.pool.get_pool_status(),
            tasks_in_queue: self
                .queue
                .get_all_tasks()
                .into_iter()
                .map(|task| TaskBrief {
                    id: task.id.clone(),
                    description: task.description.clone(),
                    status: task.status,
                    assigned_worker: task.assigned_worker.clone(),
                })
                .collect(),
        }
    }

    /// Executes one batch concurrently, bounded by `max_parallel`
    /// semaphore permits. Completion order within the batch is
    /// unspecified; results come back in dispatch order.
    async fn run_batch(&self, batch: Vec<BatchItem>) -> Vec<BatchResult> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel));
        let futures = batch.into_iter().map(|item| {
            let backend = Arc::clone(&self.backend);
            let semaphore = Arc::clone(&semaphore);
            async move {
                // the semaphore is never closed, so acquisition cannot fail
                let _permit = semaphore.acquire_owned().await.ok();
                let start = Instant::now();
                let outcome = backend
                    .execute(&item.task_id, &item.description, &item.worker)
                    .await;
                BatchResult {
                    task_id: item.task_id,
                    worker: item.worker,
                    outcome,
                    duration_seconds: start.elapsed().as_secs_f64(),
                }
            }
        });
        join_all(futures).await
    }

    /// Applies batch outcomes to the queue and pool, then emits one
    /// performance event per task. Returns how many tasks completed.
    async fn apply_batch(
        &mut self,
        run_id: Uuid,
        results: Vec<BatchResult>,
    ) -> MusterResult<usize> {
        let mut completed = 0;
        for BatchResult {
            task_id,
            worker,
            outcome,
            duration_seconds,
        } in results
        {
            let success = outcome.is_ok();
            match outcome {
                Ok(output) => {
                    self.queue.mark_complete(&task_id, output)?;
                    self.pool.mark_task_complete(&worker, true)?;
                    completed += 1;
                    info!(
                        run_id = %run_id,
                        task_id = %task_id,
                        worker = %worker,
                        "Task completed"
                    );
                }
                Err(e) => {
                    let message = e.to_string();
                    self.queue.mark_failed(&task_id, message.clone())?;
                    self.pool.mark_task_complete(&worker, false)?;
                    error!(
                        run_id = %run_id,
                        task_id = %task_id,
                        worker = %worker,
                        error = %message,
                        "Task failed"
                    );
                }
            }
            self.recorder
                .record(PerformanceEvent {
                    run_id,
                    worker,
                    task_id,
                    phase: self.config.phase.clone(),
                    success,
                    duration_seconds,
                    cost: None,
                    recorded_at: Utc::now(),
                })
                .await;
        }
        Ok(completed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_report_serialization() {
        let report = ExecutionReport {
            run_id: Uuid::new_v4(),
            objective: "Build the thing".to_string(),
            tasks_total: 4,
            tasks_completed: 3,
            tasks_failed: 1,
            iterations: 2,
            duration_seconds: 1.5,
            status: RunStatus::Incomplete,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"status\":\"incomplete\""));

        let parsed: ExecutionReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.tasks_total, 4);
        assert_eq!(parsed.status, RunStatus::Incomplete);
    }

    #[test]
    fn test_run_status_display() {
        assert_eq!(RunStatus::Completed.to_string(), "completed");
        assert_eq!(RunStatus::Incomplete.to_string(), "incomplete");
    }

    #[test]
    fn test_progress_snapshot_serialization() {
        let snapshot = ProgressSnapshot {
            queue: QueueSummary {
                total: 2,
                pending: 1,
                in_progress: 0,
                completed: 1,
                failed: 0,
                blocked: 0,
            },
            agent_pool: PoolStatus {
                total_agents: 2,
                available_agents: 2,
                busy_agents: 0,
            },
            tasks_in_queue: vec![TaskBrief {
                id: "t1".to_string(),
                description: "done already".to_string(),
                status: TaskStatus::Completed,
                assigned_worker: Some("w1".to_string()),
            }],
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["queue"]["total"], 2);
        assert_eq!(json["agent_pool"]["busy_agents"], 0);
        assert_eq!(json["tasks_in_queue"][0]["status"], "completed");
    }
}

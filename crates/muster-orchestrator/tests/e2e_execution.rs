//! End-to-end execution test.
//!
//! Drives full project runs through [`MultiAgentExecutor`] using a mock
//! execution backend. Checks: dependency-ordered scheduling, the
//! concurrency bound, failure isolation, deadlock and budget handling,
//! worker routing determinism, and recorder event flow.

use async_trait::async_trait;
use muster_core::{
    ExecutorConfig, MonitorConfig, MusterConfig, MusterError, MusterResult, WorkerDefinition,
};
use muster_orchestrator::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Mock execution backend — deterministic decomposition, scripted failures
// ---------------------------------------------------------------------------

struct MockBackend {
    specs: Vec<TaskSpec>,
    decompose_error: Option<String>,
    fail_ids: HashSet<String>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    /// Task ids in the order `execute` was entered.
    execution_log: Mutex<Vec<String>>,
}

impl MockBackend {
    fn new(specs: Vec<TaskSpec>) -> Self {
        Self {
            specs,
            decompose_error: None,
            fail_ids: HashSet::new(),
            delay: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            execution_log: Mutex::new(Vec::new()),
        }
    }

    fn with_decompose_failure(mut self, message: &str) -> Self {
        self.decompose_error = Some(message.to_string());
        self
    }

    fn with_failures(mut self, ids: &[&str]) -> Self {
        self.fail_ids = ids.iter().map(|id| (*id).to_string()).collect();
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn execution_order(&self) -> Vec<String> {
        self.execution_log.lock().unwrap().clone()
    }

    fn peak_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionBackend for MockBackend {
    async fn decompose(&self, _objective: &str) -> MusterResult<Vec<TaskSpec>> {
        if let Some(message) = &self.decompose_error {
            return Err(MusterError::Decompose(message.clone()));
        }
        Ok(self.specs.clone())
    }

    async fn execute(
        &self,
        task_id: &str,
        _description: &str,
        worker: &str,
    ) -> MusterResult<String> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        self.execution_log.lock().unwrap().push(task_id.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.fail_ids.contains(task_id) {
            return Err(MusterError::Execution(format!("{task_id} blew up")));
        }
        Ok(format!("{task_id} done by {worker}"))
    }
}

/// Routes executor logs into the captured test output. Safe to call
/// from every test; only the first call installs the subscriber.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

fn spec(id: &str, deps: &[&str]) -> TaskSpec {
    TaskSpec::new(id, format!("work on {id}"))
        .with_dependencies(deps.iter().map(|d| (*d).to_string()).collect())
}

fn generalist_roster(count: usize) -> Vec<WorkerDefinition> {
    (1..=count)
        .map(|n| WorkerDefinition::new(format!("worker-{n}"), vec![]))
        .collect()
}

fn test_config(workers: Vec<WorkerDefinition>, executor: ExecutorConfig) -> MusterConfig {
    MusterConfig {
        workers,
        executor,
        monitor: MonitorConfig::default(),
    }
}

// ---------------------------------------------------------------------------
// Test: 5 independent tasks drain in ceil(5/2) = 3 passes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_independent_tasks_complete_in_batches() {
    let specs = (1..=5).map(|n| spec(&format!("t{n}"), &[])).collect();
    let backend = Arc::new(MockBackend::new(specs));
    let config = test_config(
        generalist_roster(3),
        ExecutorConfig {
            max_parallel: 2,
            ..ExecutorConfig::default()
        },
    );

    let mut executor = MultiAgentExecutor::new(backend, config);
    let report = executor.execute_project("five independent tasks").await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.tasks_total, 5);
    assert_eq!(report.tasks_completed, 5);
    assert_eq!(report.tasks_failed, 0);
    // 2 + 2 + 1
    assert_eq!(report.iterations, 3);
    assert!(report.duration_seconds >= 0.0);
}

// ---------------------------------------------------------------------------
// Test: diamond dependency graph executes in topological order
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_diamond_executes_in_dependency_order() {
    let specs = vec![
        spec("setup", &[]),
        spec("left", &["setup"]),
        spec("right", &["setup"]),
        spec("merge", &["left", "right"]),
    ];
    let backend = Arc::new(MockBackend::new(specs));
    let config = test_config(generalist_roster(3), ExecutorConfig::default());

    let mut executor = MultiAgentExecutor::new(backend.clone(), config);
    let report = executor.execute_project("diamond").await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.tasks_completed, 4);
    assert_eq!(report.iterations, 3);

    let order = backend.execution_order();
    let position = |id: &str| order.iter().position(|t| t == id).unwrap();
    assert!(position("setup") < position("left"));
    assert!(position("setup") < position("right"));
    assert!(position("left") < position("merge"));
    assert!(position("right") < position("merge"));
}

// ---------------------------------------------------------------------------
// Test: a failed task never blocks unrelated work and is never retried
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_failure_isolation() {
    init_tracing();
    let specs = vec![
        spec("flaky", &[]),
        spec("dependent", &["flaky"]),
        spec("unrelated", &[]),
    ];
    let backend = Arc::new(MockBackend::new(specs).with_failures(&["flaky"]));
    let config = test_config(generalist_roster(3), ExecutorConfig::default());

    let mut executor = MultiAgentExecutor::new(backend.clone(), config);
    let report = executor.execute_project("one branch fails").await.unwrap();

    assert_eq!(report.status, RunStatus::Incomplete);
    assert_eq!(report.tasks_completed, 1);
    assert_eq!(report.tasks_failed, 1);

    // flaky ran exactly once
    let order = backend.execution_order();
    assert_eq!(order.iter().filter(|t| *t == "flaky").count(), 1);
    // the dependent never ran
    assert!(!order.iter().any(|t| t == "dependent"));

    assert!(executor.queue().has_failures());
    let dependent = executor.queue().get_task("dependent").unwrap();
    assert_eq!(dependent.status, TaskStatus::Pending);
}

// ---------------------------------------------------------------------------
// Test: unresolvable dependencies deadlock immediately, bounded
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_unresolvable_dependencies_deadlock() {
    init_tracing();
    let specs = vec![spec("t1", &["ghost-a"]), spec("t2", &["ghost-b"])];
    let backend = Arc::new(MockBackend::new(specs));
    let config = test_config(generalist_roster(2), ExecutorConfig::default());

    let mut executor = MultiAgentExecutor::new(backend.clone(), config);
    let report = executor.execute_project("all blocked").await.unwrap();

    assert_eq!(report.status, RunStatus::Incomplete);
    assert_eq!(report.tasks_completed, 0);
    assert_eq!(report.tasks_failed, 0);
    // detected on the first pass, not spun until the budget ran out
    assert_eq!(report.iterations, 1);
    assert!(backend.execution_order().is_empty());

    let summary = executor.queue().get_status_summary();
    assert_eq!(summary.blocked, 2);
    assert_eq!(summary.pending, 0);
}

// ---------------------------------------------------------------------------
// Test: in-flight executions never exceed max_parallel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_concurrency_bound_holds() {
    let specs = (1..=6).map(|n| spec(&format!("t{n}"), &[])).collect();
    let backend = Arc::new(MockBackend::new(specs).with_delay(Duration::from_millis(20)));
    let config = test_config(
        generalist_roster(6),
        ExecutorConfig {
            max_parallel: 2,
            ..ExecutorConfig::default()
        },
    );

    let mut executor = MultiAgentExecutor::new(backend.clone(), config);
    let report = executor.execute_project("bounded").await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.tasks_completed, 6);
    // the two tasks of each batch overlap on the sleep, never a third
    assert_eq!(backend.peak_concurrency(), 2);
}

// ---------------------------------------------------------------------------
// Test: one recorder event per dispatched task
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_recorder_receives_events() {
    let specs = vec![spec("ok-1", &[]), spec("bad", &[]), spec("ok-2", &[])];
    let backend = Arc::new(MockBackend::new(specs).with_failures(&["bad"]));
    let recorder = Arc::new(InMemoryRecorder::new());
    let config = test_config(generalist_roster(3), ExecutorConfig::default());

    let mut executor =
        MultiAgentExecutor::new(backend, config).with_recorder(recorder.clone());
    let report = executor.execute_project("record everything").await.unwrap();

    let events = recorder.events();
    assert_eq!(events.len(), 3);

    for event in &events {
        assert_eq!(event.run_id, report.run_id);
        assert_eq!(event.phase, "execution");
        assert!(event.worker.starts_with("worker-"));
        assert!(event.duration_seconds >= 0.0);
        assert!(event.cost.is_none());
    }

    let bad = events.iter().find(|e| e.task_id == "bad").unwrap();
    assert!(!bad.success);
    assert_eq!(events.iter().filter(|e| e.success).count(), 2);
}

// ---------------------------------------------------------------------------
// Test: a configured phase label tags every recorder event
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_phase_tags_events() {
    init_tracing();
    let specs = vec![spec("t1", &[]), spec("t2", &[])];
    let backend = Arc::new(MockBackend::new(specs));
    let recorder = Arc::new(InMemoryRecorder::new());
    let config = test_config(
        generalist_roster(2),
        ExecutorConfig {
            phase: "review".to_string(),
            ..ExecutorConfig::default()
        },
    );

    let mut executor =
        MultiAgentExecutor::new(backend, config).with_recorder(recorder.clone());
    executor.execute_project("tag by phase").await.unwrap();

    let events = recorder.events();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.phase == "review"));
}

// ---------------------------------------------------------------------------
// Test: progress snapshot reflects final queue and pool state
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_progress_snapshot_after_run() {
    let specs = vec![spec("a", &[]), spec("b", &["a"])];
    let backend = Arc::new(MockBackend::new(specs));
    let config = test_config(generalist_roster(2), ExecutorConfig::default());

    let mut executor = MultiAgentExecutor::new(backend, config);
    executor.execute_project("snapshot me").await.unwrap();

    let progress = executor.get_progress();
    assert_eq!(progress.queue.total, 2);
    assert_eq!(progress.queue.completed, 2);
    assert_eq!(progress.queue.in_progress, 0);
    // workers were released as their tasks resolved
    assert_eq!(progress.agent_pool.available_agents, 2);
    assert_eq!(progress.agent_pool.busy_agents, 0);

    // rows come back in registration order
    assert_eq!(progress.tasks_in_queue.len(), 2);
    assert_eq!(progress.tasks_in_queue[0].id, "a");
    assert_eq!(progress.tasks_in_queue[1].id, "b");
    for row in &progress.tasks_in_queue {
        assert_eq!(row.status, TaskStatus::Completed);
        assert!(row.assigned_worker.is_some());
    }
}

// ---------------------------------------------------------------------------
// Test: identical runs assign identical workers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_worker_assignment_is_deterministic() {
    let roster = || {
        vec![
            WorkerDefinition::new("backend-dev", vec!["rust".to_string(), "api".to_string()]),
            WorkerDefinition::new("frontend-dev", vec!["javascript".to_string()]),
            WorkerDefinition::new("generalist", vec!["rust".to_string(), "docs".to_string()]),
        ]
    };
    let specs = || {
        vec![
            TaskSpec::new("api", "build the api")
                .with_capabilities(vec!["rust".to_string(), "api".to_string()]),
            TaskSpec::new("ui", "build the ui")
                .with_capabilities(vec!["javascript".to_string()]),
            TaskSpec::new("docs", "write the docs")
                .with_capabilities(vec!["docs".to_string()]),
        ]
    };

    let mut assignments = Vec::new();
    for _ in 0..2 {
        let backend = Arc::new(MockBackend::new(specs()));
        let config = test_config(roster(), ExecutorConfig::default());
        let mut executor = MultiAgentExecutor::new(backend, config);
        executor.execute_project("route by capability").await.unwrap();

        let mut run: Vec<(String, String)> = executor
            .queue()
            .get_all_tasks()
            .into_iter()
            .map(|task| (task.id.clone(), task.assigned_worker.clone().unwrap()))
            .collect();
        run.sort();
        assignments.push(run);
    }
    assert_eq!(assignments[0], assignments[1]);

    // capability overlap routed each task to its specialist
    let routed: Vec<&str> = assignments[0].iter().map(|(_, w)| w.as_str()).collect();
    assert_eq!(routed, vec!["backend-dev", "generalist", "frontend-dev"]);
}

// ---------------------------------------------------------------------------
// Test: an unservable task is passed over, not stranding later ready work
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_unmatchable_task_passed_over() {
    // the unservable task comes first in ready order
    let specs = vec![
        TaskSpec::new("t-doc", "write the guide").with_capabilities(vec!["docs".to_string()]),
        TaskSpec::new("t-rust", "build the crate").with_capabilities(vec!["rust".to_string()]),
    ];
    let roster = vec![WorkerDefinition::new("rust-dev", vec!["rust".to_string()])];
    let backend = Arc::new(MockBackend::new(specs));
    let config = test_config(
        roster,
        ExecutorConfig {
            max_parallel: 1,
            ..ExecutorConfig::default()
        },
    );

    let mut executor = MultiAgentExecutor::new(backend.clone(), config);
    let report = executor.execute_project("mixed requirements").await.unwrap();

    assert_eq!(report.status, RunStatus::Incomplete);
    assert_eq!(report.tasks_completed, 1);
    assert_eq!(backend.execution_order(), vec!["t-rust"]);

    assert_eq!(
        executor.queue().get_task("t-rust").unwrap().status,
        TaskStatus::Completed
    );
    assert_eq!(
        executor.queue().get_task("t-doc").unwrap().status,
        TaskStatus::Pending
    );
}

// ---------------------------------------------------------------------------
// Test: randomized DAG always executes in a valid topological order
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_randomized_dag_respects_dependencies() {
    let mut rng = StdRng::seed_from_u64(42);
    let count = 15;
    let mut specs = Vec::with_capacity(count);
    for i in 0..count {
        let id = format!("t{i:02}");
        // depend only on earlier tasks, so the graph stays acyclic
        let deps: Vec<String> = (0..i)
            .filter(|_| rng.random_range(0..4) == 0)
            .map(|d| format!("t{d:02}"))
            .collect();
        specs.push(TaskSpec::new(id, "generated").with_dependencies(deps));
    }
    let dependencies: Vec<Vec<String>> =
        specs.iter().map(|s| s.dependencies.clone()).collect();

    let backend = Arc::new(MockBackend::new(specs));
    let config = test_config(
        generalist_roster(4),
        ExecutorConfig {
            max_parallel: 4,
            max_iterations: 30,
            ..ExecutorConfig::default()
        },
    );

    let mut executor = MultiAgentExecutor::new(backend.clone(), config);
    let report = executor.execute_project("random dag").await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.tasks_completed, count);

    let order = backend.execution_order();
    let position = |id: &str| order.iter().position(|t| t == id).unwrap();
    for (i, deps) in dependencies.iter().enumerate() {
        let id = format!("t{i:02}");
        for dep in deps {
            assert!(
                position(dep) < position(&id),
                "{dep} must execute before {id}"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Test: empty decomposition completes vacuously
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_empty_decomposition() {
    let backend = Arc::new(MockBackend::new(vec![]));
    let config = test_config(generalist_roster(2), ExecutorConfig::default());

    let mut executor = MultiAgentExecutor::new(backend, config);
    let report = executor.execute_project("nothing to do").await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.tasks_total, 0);
    assert_eq!(report.iterations, 0);
}

// ---------------------------------------------------------------------------
// Test: duplicate ids from decomposition fail the run outright
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_duplicate_decomposition_ids_rejected() {
    let specs = vec![spec("same", &[]), spec("same", &[])];
    let backend = Arc::new(MockBackend::new(specs));
    let config = test_config(generalist_roster(2), ExecutorConfig::default());

    let mut executor = MultiAgentExecutor::new(backend, config);
    let err = executor.execute_project("broken plan").await.unwrap_err();
    assert!(matches!(err, MusterError::DuplicateTask(id) if id == "same"));
}

// ---------------------------------------------------------------------------
// Test: a failing decomposition aborts the run before anything is scheduled
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_decompose_failure_aborts_run() {
    let backend = Arc::new(MockBackend::new(vec![]).with_decompose_failure("planner offline"));
    let config = test_config(generalist_roster(2), ExecutorConfig::default());

    let mut executor = MultiAgentExecutor::new(backend.clone(), config);
    let err = executor.execute_project("never starts").await.unwrap_err();

    assert!(matches!(err, MusterError::Decompose(_)));
    assert!(err.to_string().contains("planner offline"));
    // nothing was scheduled and nothing ran
    assert_eq!(executor.get_progress().queue.total, 0);
    assert!(backend.execution_order().is_empty());
}

// ---------------------------------------------------------------------------
// Test: iteration budget stops a chain that outlasts it
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_iteration_budget_enforced() {
    // 12-link chain: one task becomes ready per pass
    let specs: Vec<TaskSpec> = (0..12)
        .map(|i| {
            if i == 0 {
                spec("c00", &[])
            } else {
                let prev = format!("c{:02}", i - 1);
                spec(&format!("c{i:02}"), &[prev.as_str()])
            }
        })
        .collect();
    let backend = Arc::new(MockBackend::new(specs));
    let config = test_config(generalist_roster(2), ExecutorConfig::default());

    let mut executor = MultiAgentExecutor::new(backend, config);
    let report = executor.execute_project("long chain").await.unwrap();

    assert_eq!(report.status, RunStatus::Incomplete);
    assert_eq!(report.iterations, 10);
    assert_eq!(report.tasks_completed, 10);
    assert_eq!(report.tasks_total, 12);
}

// ---------------------------------------------------------------------------
// Test: convergence halt stops a run whose progress flatlined
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_e2e_convergence_halt() {
    init_tracing();
    let ids: Vec<String> = (1..=10).map(|n| format!("t{n}")).collect();
    let fail_all: Vec<&str> = ids.iter().map(String::as_str).collect();
    let specs = ids.iter().map(|id| spec(id, &[])).collect();
    let backend = Arc::new(MockBackend::new(specs).with_failures(&fail_all));
    let config = test_config(
        generalist_roster(4),
        ExecutorConfig {
            max_parallel: 2,
            halt_on_convergence: true,
            ..ExecutorConfig::default()
        },
    );

    let mut executor = MultiAgentExecutor::new(backend, config);
    let report = executor.execute_project("going nowhere").await.unwrap();

    assert_eq!(report.status, RunStatus::Incomplete);
    // three flat passes fill the convergence window, then the halt fires
    assert_eq!(report.iterations, 3);
    assert_eq!(report.tasks_failed, 6);
    assert_eq!(report.tasks_completed, 0);

    let metrics = executor.quality_metrics();
    assert_eq!(metrics.iterations, 3);
    assert_eq!(metrics.total_tasks_completed, 0);
}

//! TOML-backed configuration for an execution run.
//!
//! A [`MusterConfig`] bundles the worker roster with the executor and
//! monitor knobs. Every field has a serde default so a minimal file only
//! needs to list workers.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{MusterError, MusterResult};

/// A single worker in the roster.
///
/// The name doubles as the opaque execution handle handed to the execute
/// capability; capability tags are matched against a task's requirements
/// during selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerDefinition {
    /// Unique worker name within the roster.
    pub name: String,
    /// Capability tags offered by this worker.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Phases this worker has an affinity for. Contextual metadata for
    /// collaborators that build per-phase rosters; selection ignores it.
    #[serde(default)]
    pub phase_affinity: Vec<String>,
    /// Upper bound on simultaneous assignments. The pool currently
    /// enforces one active assignment per worker regardless.
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
}

impl WorkerDefinition {
    /// Creates a worker definition with the given name and capabilities.
    pub fn new(name: impl Into<String>, capabilities: Vec<String>) -> Self {
        Self {
            name: name.into(),
            capabilities,
            phase_affinity: Vec::new(),
            max_concurrent_tasks: default_max_concurrent_tasks(),
        }
    }

    /// Sets the phase affinity list.
    pub fn with_phase_affinity(mut self, phases: Vec<String>) -> Self {
        self.phase_affinity = phases;
        self
    }
}

/// Limits and labels for the executor's iteration loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Maximum number of concurrently in-flight task executions.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    /// Maximum number of scheduling passes before the run is cut off.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Stop the run when the quality monitor reports no improvement.
    /// Off by default: the monitor's verdict is advisory.
    #[serde(default)]
    pub halt_on_convergence: bool,
    /// Label attached to log lines and performance events for this run.
    #[serde(default = "default_phase")]
    pub phase: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            max_iterations: default_max_iterations(),
            halt_on_convergence: false,
            phase: default_phase(),
        }
    }
}

/// Thresholds for convergence and repetition detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Minimum coverage delta that still counts as progress.
    #[serde(default = "default_min_coverage_improvement")]
    pub min_coverage_improvement: f64,
    /// How many stagnant samples in a row end the improvement window.
    #[serde(default = "default_max_iterations_without_improvement")]
    pub max_iterations_without_improvement: usize,
    /// Similarity at or above this value counts as a repeated output.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            min_coverage_improvement: default_min_coverage_improvement(),
            max_iterations_without_improvement: default_max_iterations_without_improvement(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

/// Top-level configuration: worker roster plus executor and monitor knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusterConfig {
    /// The worker roster, in declaration order. Order matters: selection
    /// ties are broken by roster position.
    pub workers: Vec<WorkerDefinition>,
    /// Executor limits.
    #[serde(default)]
    pub executor: ExecutorConfig,
    /// Monitor thresholds.
    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl MusterConfig {
    /// Parses and validates a configuration from a TOML string.
    pub fn from_toml_str(input: &str) -> MusterResult<Self> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses, and validates a configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> MusterResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Checks roster and limit consistency.
    pub fn validate(&self) -> MusterResult<()> {
        if self.executor.max_parallel == 0 {
            return Err(MusterError::Config(
                "executor.max_parallel must be at least 1".to_string(),
            ));
        }
        if self.executor.max_iterations == 0 {
            return Err(MusterError::Config(
                "executor.max_iterations must be at least 1".to_string(),
            ));
        }
        if self.monitor.max_iterations_without_improvement == 0 {
            // a zero-length window would read as instant stagnation
            return Err(MusterError::Config(
                "monitor.max_iterations_without_improvement must be at least 1".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for worker in &self.workers {
            if worker.name.is_empty() {
                return Err(MusterError::Config(
                    "worker name must not be empty".to_string(),
                ));
            }
            if !seen.insert(worker.name.as_str()) {
                return Err(MusterError::Config(format!(
                    "duplicate worker name '{}' in roster",
                    worker.name
                )));
            }
        }
        Ok(())
    }
}

fn default_max_concurrent_tasks() -> usize {
    1
}
fn default_max_parallel() -> usize {
    3
}
fn default_max_iterations() -> usize {
    10
}
fn default_phase() -> String {
    "execution".to_string()
}
fn default_min_coverage_improvement() -> f64 {
    0.05
}
fn default_max_iterations_without_improvement() -> usize {
    3
}
fn default_similarity_threshold() -> f64 {
    0.95
}

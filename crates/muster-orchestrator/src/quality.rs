//! Iteration history, convergence checks, and repetition detection.
//!
//! The monitor never stops a run by itself: `should_continue` hands back
//! a verdict and a reason, and the executor (or an outer loop) decides
//! what to do with it. Repetition detection is exact-match only, backed
//! by SHA-256 fingerprints of previously seen outputs.

use muster_core::MonitorConfig;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

/// Metrics captured for one scheduling pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// Iteration number as reported by the caller.
    pub iteration: usize,
    /// Coverage percentage, if one was measured this pass.
    pub coverage: Option<f64>,
    /// Quality score, if one was measured this pass.
    pub quality_score: Option<f64>,
    /// Tasks completed during this pass.
    pub tasks_completed: usize,
}

/// Direction of the recent coverage series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    /// Every recent consecutive difference is positive.
    Improving,
    /// Every recent consecutive difference is negative.
    Declining,
    /// Mixed or flat differences.
    Stable,
    /// Fewer than two coverage samples recorded.
    InsufficientData,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Improving => "improving",
            Self::Declining => "declining",
            Self::Stable => "stable",
            Self::InsufficientData => "insufficient_data",
        };
        write!(f, "{label}")
    }
}

/// Snapshot of the monitor's view of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// Number of iterations recorded so far.
    pub iterations: usize,
    /// Coverage from the most recent record.
    pub current_coverage: Option<f64>,
    /// Quality score from the most recent record.
    pub current_quality_score: Option<f64>,
    /// Sum of per-iteration completed-task counts.
    pub total_tasks_completed: usize,
    /// Direction of the last few coverage samples.
    pub coverage_trend: Trend,
}

/// Convergence and repetition monitor for one execution run.
pub struct QualityMonitor {
    config: MonitorConfig,
    iteration_history: Vec<IterationRecord>,
    output_hashes: HashMap<String, HashSet<String>>,
    coverage_history: Vec<f64>,
}

impl QualityMonitor {
    /// Creates a monitor with the given thresholds.
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            iteration_history: Vec::new(),
            output_hashes: HashMap::new(),
            coverage_history: Vec::new(),
        }
    }

    /// Appends one iteration record. Coverage values are additionally
    /// kept in a separate series for trend analysis.
    pub fn record_iteration(
        &mut self,
        iteration: usize,
        coverage: Option<f64>,
        quality_score: Option<f64>,
        tasks_completed: usize,
    ) {
        self.iteration_history.push(IterationRecord {
            iteration,
            coverage,
            quality_score,
            tasks_completed,
        });
        if let Some(value) = coverage {
            self.coverage_history.push(value);
        }
    }

    /// Returns 1.0 iff `output` is byte-identical to a previously seen
    /// output for this task, else stores its fingerprint and returns 0.0.
    pub fn check_output_similarity(&mut self, task_id: &str, output: &str) -> f64 {
        let fingerprint = format!("{:x}", Sha256::digest(output.as_bytes()));
        let seen = self.output_hashes.entry(task_id.to_string()).or_default();
        if seen.contains(&fingerprint) {
            return 1.0;
        }
        seen.insert(fingerprint);
        0.0
    }

    /// Whether this output repeats an earlier one for the same task.
    pub fn detect_loop(&mut self, task_id: &str, output: &str) -> bool {
        self.check_output_similarity(task_id, output) >= self.config.similarity_threshold
    }

    /// Verdict on whether the run is still making progress.
    ///
    /// Returns `(true, "insufficient_data")` until two iterations exist.
    /// Once enough coverage samples are in, returns false when every
    /// delta over the last `max_iterations_without_improvement` samples
    /// falls below `min_coverage_improvement`.
    pub fn should_continue(&self, _iteration: usize) -> (bool, String) {
        if self.iteration_history.len() < 2 {
            return (true, "insufficient_data".to_string());
        }

        let window = self.config.max_iterations_without_improvement;
        if self.coverage_history.len() >= window {
            let recent = &self.coverage_history[self.coverage_history.len() - window..];
            let stagnant = recent
                .windows(2)
                .all(|pair| pair[1] - pair[0] < self.config.min_coverage_improvement);
            if stagnant {
                return (
                    false,
                    format!("No coverage improvement in {window} iterations"),
                );
            }
        }

        (true, "quality_improving".to_string())
    }

    /// Snapshot: latest record plus the coverage trend.
    pub fn get_quality_metrics(&self) -> QualityMetrics {
        let latest = self.iteration_history.last();
        QualityMetrics {
            iterations: self.iteration_history.len(),
            current_coverage: latest.and_then(|record| record.coverage),
            current_quality_score: latest.and_then(|record| record.quality_score),
            total_tasks_completed: self
                .iteration_history
                .iter()
                .map(|record| record.tasks_completed)
                .sum(),
            coverage_trend: self.coverage_trend(),
        }
    }

    fn coverage_trend(&self) -> Trend {
        if self.coverage_history.len() < 2 {
            return Trend::InsufficientData;
        }
        let start = self.coverage_history.len().saturating_sub(3);
        let recent = &self.coverage_history[start..];
        if recent.windows(2).all(|pair| pair[1] > pair[0]) {
            Trend::Improving
        } else if recent.windows(2).all(|pair| pair[1] < pair[0]) {
            Trend::Declining
        } else {
            Trend::Stable
        }
    }
}

impl Default for QualityMonitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

//! Worker pool: a fixed roster with availability tracking and
//! deterministic capability-aware selection.

use crate::types::{AgentInstance, PoolStatus};
use muster_core::{MusterError, MusterResult, WorkerDefinition};

/// Pool of workers for one execution run.
///
/// The roster is fixed at construction; declaration order is significant
/// because selection ties break toward the earlier entry. Workers hold at
/// most one assignment at a time.
pub struct AgentPool {
    agents: Vec<AgentInstance>,
}

impl AgentPool {
    /// Builds a pool from roster definitions, preserving their order.
    pub fn new(roster: &[WorkerDefinition]) -> Self {
        Self {
            agents: roster.iter().map(AgentInstance::from_definition).collect(),
        }
    }

    /// Workers with no active assignment, in declaration order.
    pub fn get_available_agents(&self) -> Vec<&AgentInstance> {
        self.agents.iter().filter(|a| a.is_available()).collect()
    }

    /// Assigns a task to a worker. Fails if the worker is unknown or
    /// already holds an assignment.
    pub fn assign_task_to_agent(&mut self, task_id: &str, worker_name: &str) -> MusterResult<()> {
        let agent = self
            .agents
            .iter_mut()
            .find(|a| a.name == worker_name)
            .ok_or_else(|| MusterError::UnknownWorker(worker_name.to_string()))?;
        if let Some(current) = &agent.current_task {
            return Err(MusterError::WorkerBusy {
                worker: worker_name.to_string(),
                task_id: current.clone(),
            });
        }
        agent.current_task = Some(task_id.to_string());
        Ok(())
    }

    /// Releases a worker's assignment and bumps its outcome counter.
    pub fn mark_task_complete(&mut self, worker_name: &str, success: bool) -> MusterResult<()> {
        let agent = self
            .agents
            .iter_mut()
            .find(|a| a.name == worker_name)
            .ok_or_else(|| MusterError::UnknownWorker(worker_name.to_string()))?;
        agent.current_task = None;
        if success {
            agent.tasks_completed += 1;
        } else {
            agent.tasks_failed += 1;
        }
        Ok(())
    }

    /// Picks the best available worker for the given requirements.
    ///
    /// Scoring is lexicographic: capability overlap first, then success
    /// ratio; ties go to the earlier roster entry. With a non-empty
    /// requirement list, workers with zero overlap are not candidates at
    /// all. An empty requirement list means every available worker
    /// qualifies and history alone decides. The selection is fully
    /// deterministic for a given roster and history.
    ///
    /// `phase` is contextual metadata for the caller's logs and recorder
    /// events; it never influences the score.
    pub fn find_best_agent(
        &self,
        required_capabilities: &[String],
        _phase: Option<&str>,
    ) -> Option<&AgentInstance> {
        let mut best: Option<(&AgentInstance, usize, f64)> = None;
        for agent in self.agents.iter().filter(|a| a.is_available()) {
            let overlap = agent.capability_overlap(required_capabilities);
            if !required_capabilities.is_empty() && overlap == 0 {
                continue;
            }
            let ratio = agent.success_ratio();
            let better = match best {
                None => true,
                Some((_, best_overlap, best_ratio)) => {
                    overlap > best_overlap || (overlap == best_overlap && ratio > best_ratio)
                }
            };
            if better {
                best = Some((agent, overlap, ratio));
            }
        }
        best.map(|(agent, _, _)| agent)
    }

    /// Looks up a worker by name.
    pub fn get_agent(&self, worker_name: &str) -> Option<&AgentInstance> {
        self.agents.iter().find(|a| a.name == worker_name)
    }

    /// Total/available/busy counts.
    pub fn get_pool_status(&self) -> PoolStatus {
        let available = self.agents.iter().filter(|a| a.is_available()).count();
        PoolStatus {
            total_agents: self.agents.len(),
            available_agents: available,
            busy_agents: self.agents.len() - available,
        }
    }
}

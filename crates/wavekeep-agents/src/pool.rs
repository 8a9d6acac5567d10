//! Bounded agent pool with capacity `MAX_AGENTS` (§4.3).

use dashmap::DashMap;
use uuid::Uuid;
use wavekeep_core::types::{Agent, AgentStatus, AgentType};

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("pool at capacity ({0})")]
    PoolCapacity(usize),
    #[error("agent `{0}` not found")]
    NotFound(Uuid),
    #[error("agent `{0}` is not idle (status: {1:?})")]
    NotIdle(Uuid, AgentStatus),
}

/// Agents are reused across tasks within a run; `agent_type` is immutable
/// after spawn.
pub struct AgentPool {
    capacity: usize,
    agents: DashMap<Uuid, Agent>,
    model: String,
}

impl AgentPool {
    pub fn new(capacity: usize, model: impl Into<String>) -> Self {
        Self {
            capacity,
            agents: DashMap::new(),
            model: model.into(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn spawn(&self, agent_type: AgentType) -> Result<Agent, PoolError> {
        if self.agents.len() >= self.capacity {
            return Err(PoolError::PoolCapacity(self.capacity));
        }
        let agent = Agent::new(agent_type, self.model.clone());
        self.agents.insert(agent.id, agent.clone());
        Ok(agent)
    }

    /// Legal only when the agent is `Idle`; transitions it to `Assigned`.
    pub fn assign(&self, agent_id: Uuid, task_id: impl Into<String>) -> Result<(), PoolError> {
        let mut entry = self.agents.get_mut(&agent_id).ok_or(PoolError::NotFound(agent_id))?;
        if entry.status != AgentStatus::Idle {
            return Err(PoolError::NotIdle(agent_id, entry.status));
        }
        entry.status = AgentStatus::Assigned;
        entry.current_task_id = Some(task_id.into());
        entry.last_used_at = chrono::Utc::now();
        Ok(())
    }

    pub fn mark_running(&self, agent_id: Uuid) -> Result<(), PoolError> {
        let mut entry = self.agents.get_mut(&agent_id).ok_or(PoolError::NotFound(agent_id))?;
        entry.status = AgentStatus::Running;
        Ok(())
    }

    /// Returns the agent to `Idle`, clears `current_task_id`, and records
    /// the metric counter for the outcome.
    pub fn release(&self, agent_id: Uuid, outcome: ReleaseOutcome) -> Result<(), PoolError> {
        let mut entry = self.agents.get_mut(&agent_id).ok_or(PoolError::NotFound(agent_id))?;
        entry.status = AgentStatus::Idle;
        entry.current_task_id = None;
        entry.last_used_at = chrono::Utc::now();
        match outcome {
            ReleaseOutcome::Completed { iterations, tokens } => {
                entry.metrics.tasks_completed += 1;
                entry.metrics.total_iterations += iterations;
                entry.metrics.cumulative_tokens += tokens;
            }
            ReleaseOutcome::Failed { iterations, tokens } => {
                entry.metrics.tasks_failed += 1;
                entry.metrics.total_iterations += iterations;
                entry.metrics.cumulative_tokens += tokens;
            }
        }
        Ok(())
    }

    pub fn terminate(&self, agent_id: Uuid) -> Result<(), PoolError> {
        let mut entry = self.agents.get_mut(&agent_id).ok_or(PoolError::NotFound(agent_id))?;
        entry.status = AgentStatus::Terminated;
        entry.current_task_id = None;
        Ok(())
    }

    /// Any `Idle` agent, preferring the most-recently-used (warm) one.
    pub fn get_available(&self) -> Option<Agent> {
        self.agents
            .iter()
            .filter(|e| e.status == AgentStatus::Idle)
            .max_by_key(|e| e.last_used_at)
            .map(|e| e.clone())
    }

    pub fn get_active(&self) -> Vec<Agent> {
        self.agents
            .iter()
            .filter(|e| matches!(e.status, AgentStatus::Assigned | AgentStatus::Running))
            .map(|e| e.clone())
            .collect()
    }

    pub fn get_by_id(&self, agent_id: Uuid) -> Option<Agent> {
        self.agents.get(&agent_id).map(|e| e.clone())
    }

    pub fn get_all(&self) -> Vec<Agent> {
        self.agents.iter().map(|e| e.clone()).collect()
    }

    pub fn size(&self) -> usize {
        self.agents.len()
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ReleaseOutcome {
    Completed { iterations: u64, tokens: u64 },
    Failed { iterations: u64, tokens: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_up_to_capacity_then_fails() {
        let pool = AgentPool::new(2, "claude-sonnet");
        pool.spawn(AgentType::Coder).unwrap();
        pool.spawn(AgentType::Coder).unwrap();
        let err = pool.spawn(AgentType::Coder).unwrap_err();
        assert!(matches!(err, PoolError::PoolCapacity(2)));
    }

    #[test]
    fn assign_requires_idle() {
        let pool = AgentPool::new(1, "claude-sonnet");
        let agent = pool.spawn(AgentType::Coder).unwrap();
        pool.assign(agent.id, "task-1").unwrap();
        let err = pool.assign(agent.id, "task-2").unwrap_err();
        assert!(matches!(err, PoolError::NotIdle(_, AgentStatus::Assigned)));
    }

    #[test]
    fn release_returns_to_idle_and_updates_metrics() {
        let pool = AgentPool::new(1, "claude-sonnet");
        let agent = pool.spawn(AgentType::Coder).unwrap();
        pool.assign(agent.id, "task-1").unwrap();
        pool.release(
            agent.id,
            ReleaseOutcome::Completed {
                iterations: 5,
                tokens: 1000,
            },
        )
        .unwrap();
        let updated = pool.get_by_id(agent.id).unwrap();
        assert_eq!(updated.status, AgentStatus::Idle);
        assert!(updated.current_task_id.is_none());
        assert_eq!(updated.metrics.tasks_completed, 1);
        assert_eq!(updated.metrics.total_iterations, 5);
    }

    #[test]
    fn get_available_prefers_most_recently_used() {
        let pool = AgentPool::new(2, "claude-sonnet");
        let a = pool.spawn(AgentType::Coder).unwrap();
        let b = pool.spawn(AgentType::Coder).unwrap();
        pool.assign(a.id, "t").unwrap();
        pool.release(a.id, ReleaseOutcome::Completed { iterations: 1, tokens: 1 })
            .unwrap();
        // `b` was never used so has an older last_used_at than freshly-released `a`.
        let available = pool.get_available().unwrap();
        assert_eq!(available.id, a.id);
        let _ = b;
    }

    #[test]
    fn terminate_removes_from_active() {
        let pool = AgentPool::new(1, "claude-sonnet");
        let agent = pool.spawn(AgentType::Coder).unwrap();
        pool.assign(agent.id, "task-1").unwrap();
        pool.terminate(agent.id).unwrap();
        assert!(pool.get_active().is_empty());
    }

    #[test]
    fn agent_type_is_immutable_after_spawn() {
        let pool = AgentPool::new(1, "claude-sonnet");
        let agent = pool.spawn(AgentType::Reviewer).unwrap();
        let fetched = pool.get_by_id(agent.id).unwrap();
        assert_eq!(fetched.agent_type, AgentType::Reviewer);
    }

    #[test]
    fn operations_on_unknown_agent_fail() {
        let pool = AgentPool::new(1, "claude-sonnet");
        let err = pool.assign(Uuid::new_v4(), "t").unwrap_err();
        assert!(matches!(err, PoolError::NotFound(_)));
    }
}

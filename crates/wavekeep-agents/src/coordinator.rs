//! Wave-by-wave task coordinator (§4.1).
//!
//! Drives `idle -> running -> paused -> running -> stopping -> idle`. Owns
//! the `Task` set; the `AgentPool` exclusively owns `Agent` records.
//! Assignment and advancement both happen inside `pump`, which is meant to
//! be re-invoked on task completion, agent release, or resume - this crate
//! leaves the re-invocation trigger to the caller (daemon event loop) rather
//! than spawning its own background task.

use std::collections::HashSet;
use std::sync::Mutex;

use chrono::Utc;
use uuid::Uuid;
use wavekeep_bridge::event_bus::EventBus;
use wavekeep_core::types::{
    AgentType, Checkpoint, CoordinatorState, Event, EventType, Task, TaskStatus,
};

use crate::pool::AgentPool;
use crate::queue::{QueueError, TaskQueue};

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("task queue rejected task: {0}")]
    Queue(#[from] QueueError),
    #[error("task plan contains a dependency cycle")]
    CyclicPlan,
    #[error("illegal transition from {0:?} via {1}")]
    IllegalTransition(CoordinatorState, &'static str),
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProjectConfig {
    pub project_id: String,
    pub tasks: Vec<Task>,
}

/// Snapshot returned by `get_progress`; never cached, always computed fresh
/// against the live `TaskQueue`/`AgentPool` state.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Progress {
    pub total_tasks: usize,
    pub completed: usize,
    pub failed: usize,
    pub escalated: usize,
    pub running: usize,
    pub queued: usize,
    pub blocked: usize,
    pub current_wave: u32,
    pub active_agents: usize,
}

struct Inner {
    state: CoordinatorState,
    project_id: String,
    queue: TaskQueue,
}

pub struct Coordinator {
    inner: Mutex<Inner>,
    pool: AgentPool,
    event_bus: EventBus,
}

impl Coordinator {
    pub fn new(pool: AgentPool, event_bus: EventBus) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: CoordinatorState::Idle,
                project_id: String::new(),
                queue: TaskQueue::new(),
            }),
            pool,
            event_bus,
        }
    }

    fn publish(&self, event_type: EventType, project_id: &str, data: serde_json::Value) {
        self.event_bus
            .emit(Event::new(event_type, data).with_project(project_id.to_string()));
    }

    /// Loads tasks, trusting a planner-provided `wave_id` when present and
    /// otherwise computing the minimum wave consistent with dependency
    /// order. Rejects a cyclic plan outright (§9).
    pub fn initialize(&self, config: ProjectConfig) -> Result<(), CoordinatorError> {
        let waves = assign_waves(&config.tasks)?;

        let mut guard = self.inner.lock().expect("coordinator lock poisoned");
        guard.project_id = config.project_id;
        guard.queue = TaskQueue::new();
        for mut task in config.tasks {
            if task.wave_id.is_none() {
                task.wave_id = waves.get(&task.id).copied();
            }
            guard.queue.enqueue(task)?;
        }
        guard.state = CoordinatorState::Idle;
        Ok(())
    }

    /// Transitions to `running` and assigns wave 0's ready tasks.
    pub fn start(&self) -> Result<(), CoordinatorError> {
        {
            let mut guard = self.inner.lock().expect("coordinator lock poisoned");
            if guard.state != CoordinatorState::Idle {
                return Err(CoordinatorError::IllegalTransition(guard.state, "start"));
            }
            guard.state = CoordinatorState::Running;
            guard.queue.set_current_wave(0);
        }
        let project_id = self.project_id();
        self.publish(EventType::CoordinatorStarted, &project_id, serde_json::json!({}));
        self.pump();
        Ok(())
    }

    /// Requests suspension. No new assignments occur; in-flight runners
    /// complete naturally. `coordinator:paused` fires once no task is
    /// `running` - here, immediately, since this crate has no background
    /// pump loop of its own to wait on.
    pub fn pause(&self) -> Result<(), CoordinatorError> {
        let mut guard = self.inner.lock().expect("coordinator lock poisoned");
        if guard.state != CoordinatorState::Running {
            return Err(CoordinatorError::IllegalTransition(guard.state, "pause"));
        }
        guard.state = CoordinatorState::Paused;
        drop(guard);
        let project_id = self.project_id();
        self.publish(EventType::CoordinatorPaused, &project_id, serde_json::json!({}));
        Ok(())
    }

    /// Legal only from `paused`; replays the pump.
    pub fn resume(&self) -> Result<(), CoordinatorError> {
        {
            let mut guard = self.inner.lock().expect("coordinator lock poisoned");
            if guard.state != CoordinatorState::Paused {
                return Err(CoordinatorError::IllegalTransition(guard.state, "resume"));
            }
            guard.state = CoordinatorState::Running;
        }
        let project_id = self.project_id();
        self.publish(EventType::CoordinatorResumed, &project_id, serde_json::json!({}));
        self.pump();
        Ok(())
    }

    /// Cancels all runners, awaits pool drain, transitions to `idle`.
    pub fn stop(&self) -> Result<(), CoordinatorError> {
        {
            let mut guard = self.inner.lock().expect("coordinator lock poisoned");
            guard.state = CoordinatorState::Stopping;
        }
        let project_id = self.project_id();
        for agent in self.pool.get_active() {
            let _ = self.pool.terminate(agent.id);
        }
        let mut guard = self.inner.lock().expect("coordinator lock poisoned");
        guard.state = CoordinatorState::Idle;
        drop(guard);
        self.publish(EventType::CoordinatorStopped, &project_id, serde_json::json!({}));
        Ok(())
    }

    fn project_id(&self) -> String {
        self.inner.lock().expect("coordinator lock poisoned").project_id.clone()
    }

    pub fn get_status(&self) -> CoordinatorState {
        self.inner.lock().expect("coordinator lock poisoned").state
    }

    /// Plain on-demand snapshot, computed fresh from the `TaskQueue` and
    /// `AgentPool`; never cached (§4.1 expansion).
    pub fn get_progress(&self) -> Progress {
        let guard = self.inner.lock().expect("coordinator lock poisoned");
        let tasks: Vec<&Task> = guard.queue.all().collect();
        Progress {
            total_tasks: tasks.len(),
            completed: tasks.iter().filter(|t| t.status == TaskStatus::Completed).count(),
            failed: tasks.iter().filter(|t| t.status == TaskStatus::Failed).count(),
            escalated: tasks.iter().filter(|t| t.status == TaskStatus::Escalated).count(),
            running: tasks.iter().filter(|t| t.status == TaskStatus::Running).count(),
            queued: tasks.iter().filter(|t| t.status == TaskStatus::Queued).count(),
            blocked: tasks
                .iter()
                .filter(|t| guard.queue.effective_status(&t.id) == Some(TaskStatus::Blocked))
                .count(),
            current_wave: guard.queue.current_wave(),
            active_agents: self.pool.get_active().len(),
        }
    }

    pub fn get_active_agents(&self) -> Vec<wavekeep_core::types::Agent> {
        self.pool.get_active()
    }

    /// Looks up a single task by id, cloned out of the live queue.
    pub fn get_task(&self, task_id: &str) -> Option<Task> {
        self.inner
            .lock()
            .expect("coordinator lock poisoned")
            .queue
            .get(task_id)
            .cloned()
    }

    pub fn get_pending_tasks(&self) -> Vec<Task> {
        let guard = self.inner.lock().expect("coordinator lock poisoned");
        guard
            .queue
            .all()
            .filter(|t| !t.status.is_terminal())
            .cloned()
            .collect()
    }

    /// Snapshots the current wave/queue into a `Checkpoint`. Persistence is
    /// the caller's responsibility via a `CheckpointStore`.
    pub fn create_checkpoint(&self, name: Option<String>) -> Checkpoint {
        let guard = self.inner.lock().expect("coordinator lock poisoned");
        let completed: Vec<String> = guard
            .queue
            .all()
            .filter(|t| t.status == TaskStatus::Completed)
            .map(|t| t.id.clone())
            .collect();
        let pending: Vec<String> = guard
            .queue
            .all()
            .filter(|t| !t.status.is_terminal())
            .map(|t| t.id.clone())
            .collect();
        Checkpoint {
            id: Uuid::new_v4(),
            name,
            project_id: guard.project_id.clone(),
            wave_id: guard.queue.current_wave(),
            completed_task_ids: completed,
            pending_task_ids: pending,
            timestamp: Utc::now(),
            coordinator_state: guard.state,
            git_commit: None,
        }
    }

    /// Called by the owning binary after a task reaches a terminal state,
    /// after an agent is released, and after `resume`. Assigns ready tasks
    /// until the wave's ready set is drained or the pool is saturated, then
    /// advances the wave (or transitions to `idle`) when the wave is spent.
    pub fn pump(&self) {
        loop {
            if self.get_status() != CoordinatorState::Running {
                return;
            }
            let assigned_any = self.assign_ready_tasks();
            let advanced = self.advance_wave_if_complete();
            if !assigned_any && !advanced {
                return;
            }
        }
    }

    /// Assigns ready tasks to available agents until either the ready set
    /// or the pool is drained. Returns whether any assignment happened.
    fn assign_ready_tasks(&self) -> bool {
        let mut assigned_any = false;
        loop {
            let ready_id = {
                let guard = self.inner.lock().expect("coordinator lock poisoned");
                guard.queue.dequeue().map(|t| t.id.clone())
            };
            let Some(task_id) = ready_id else { break };
            let Some(agent) = self.pool.get_available() else { break };

            {
                let mut guard = self.inner.lock().expect("coordinator lock poisoned");
                let _ = guard.queue.mark_assigned(&task_id);
            }
            if self.pool.assign(agent.id, task_id.clone()).is_err() {
                let mut guard = self.inner.lock().expect("coordinator lock poisoned");
                let _ = guard.queue.mark_running(&task_id);
                continue;
            }
            assigned_any = true;
            let project_id = self.project_id();
            self.publish(
                EventType::TaskAssigned,
                &project_id,
                serde_json::json!({ "taskId": task_id, "agentId": agent.id }),
            );
        }
        assigned_any
    }

    /// When every task in the current wave is terminal, advances to the
    /// next pending wave (or transitions to `idle` when none remains).
    /// Returns whether a wave transition happened.
    fn advance_wave_if_complete(&self) -> bool {
        let project_id = self.project_id();
        let (current_wave, wave_done) = {
            let guard = self.inner.lock().expect("coordinator lock poisoned");
            let wave = guard.queue.current_wave();
            (wave, guard.queue.wave_complete(wave))
        };
        if !wave_done {
            return false;
        }

        self.publish(EventType::WaveCompleted, &project_id, serde_json::json!({ "wave": current_wave }));

        let next_wave = {
            let guard = self.inner.lock().expect("coordinator lock poisoned");
            guard.queue.next_pending_wave()
        };

        match next_wave {
            Some(wave) => {
                {
                    let mut guard = self.inner.lock().expect("coordinator lock poisoned");
                    guard.queue.set_current_wave(wave);
                }
                self.publish(EventType::WaveStarted, &project_id, serde_json::json!({ "wave": wave }));
                true
            }
            None => {
                {
                    let mut guard = self.inner.lock().expect("coordinator lock poisoned");
                    guard.state = CoordinatorState::Idle;
                }
                self.publish(EventType::CoordinatorStopped, &project_id, serde_json::json!({}));
                false
            }
        }
    }

    /// Records a task's terminal outcome and attempts another pump tick.
    pub fn report_task_outcome(&self, task_id: &str, agent_id: Uuid, outcome: crate::pool::ReleaseOutcome, escalated: bool, failed: bool) {
        {
            let mut guard = self.inner.lock().expect("coordinator lock poisoned");
            if escalated {
                let _ = guard.queue.mark_escalated(task_id);
            } else if failed {
                let _ = guard.queue.mark_failed(task_id);
            } else {
                let _ = guard.queue.mark_complete(task_id);
            }
        }
        let _ = self.pool.release(agent_id, outcome);
        let project_id = self.project_id();
        let event_type = if escalated {
            EventType::TaskEscalated
        } else if failed {
            EventType::TaskFailed
        } else {
            EventType::TaskCompleted
        };
        self.publish(event_type, &project_id, serde_json::json!({ "taskId": task_id }));
        self.pump();
    }

    pub fn spawn_agent(&self, agent_type: AgentType) -> Result<wavekeep_core::types::Agent, crate::pool::PoolError> {
        self.pool.spawn(agent_type)
    }

    pub fn queue_size(&self) -> usize {
        self.inner.lock().expect("coordinator lock poisoned").queue.size()
    }
}

/// Computes the minimum wave id for every task consistent with dependency
/// order (a task's wave is one greater than the max of its dependencies'
/// waves, or 0 with no dependencies), detecting cycles via retain-until-
/// no-progress the same way the teacher's `execution_order` does.
fn assign_waves(tasks: &[Task]) -> Result<std::collections::HashMap<String, u32>, CoordinatorError> {
    let mut waves = std::collections::HashMap::new();
    let mut remaining: Vec<&Task> = tasks.iter().collect();
    let mut resolved: HashSet<String> = HashSet::new();

    while !remaining.is_empty() {
        let before = remaining.len();
        let mut next_remaining = Vec::new();

        for task in remaining {
            if task.wave_id.is_some() {
                waves.insert(task.id.clone(), task.wave_id.unwrap());
                resolved.insert(task.id.clone());
                continue;
            }
            if task.dependencies.iter().all(|d| resolved.contains(d)) {
                let max_dep_wave = task
                    .dependencies
                    .iter()
                    .filter_map(|d| waves.get(d).copied())
                    .max();
                let wave = max_dep_wave.map(|w| w + 1).unwrap_or(0);
                waves.insert(task.id.clone(), wave);
                resolved.insert(task.id.clone());
            } else {
                next_remaining.push(task);
            }
        }

        if next_remaining.len() == before {
            return Err(CoordinatorError::CyclicPlan);
        }
        remaining = next_remaining;
    }

    Ok(waves)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wavekeep_core::types::Task;

    fn task(id: &str, deps: &[&str]) -> Task {
        let mut t = Task::new(id, id, 1);
        t.dependencies = deps.iter().map(|s| s.to_string()).collect();
        t
    }

    fn coordinator(capacity: usize) -> Coordinator {
        Coordinator::new(AgentPool::new(capacity, "test-model"), EventBus::new())
    }

    #[test]
    fn initialize_computes_waves_when_absent() {
        let c = coordinator(2);
        c.initialize(ProjectConfig {
            project_id: "p1".to_string(),
            tasks: vec![task("a", &[]), task("b", &["a"])],
        })
        .unwrap();
        assert_eq!(c.get_status(), CoordinatorState::Idle);
    }

    #[test]
    fn initialize_rejects_cyclic_plan() {
        let c = coordinator(2);
        let mut a = task("a", &["b"]);
        let mut b = task("b", &["a"]);
        a.wave_id = None;
        b.wave_id = None;
        let err = c
            .initialize(ProjectConfig {
                project_id: "p1".to_string(),
                tasks: vec![a, b],
            })
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::CyclicPlan));
    }

    #[test]
    fn start_requires_idle_and_is_idempotent_failure() {
        let c = coordinator(1);
        c.initialize(ProjectConfig {
            project_id: "p1".to_string(),
            tasks: vec![task("a", &[])],
        })
        .unwrap();
        c.pool.spawn(AgentType::Coder).unwrap();
        c.start().unwrap();
        let err = c.start().unwrap_err();
        assert!(matches!(err, CoordinatorError::IllegalTransition(CoordinatorState::Running, "start")));
    }

    #[test]
    fn start_assigns_ready_tasks_to_available_agents() {
        let c = coordinator(1);
        c.initialize(ProjectConfig {
            project_id: "p1".to_string(),
            tasks: vec![task("a", &[])],
        })
        .unwrap();
        let agent = c.pool.spawn(AgentType::Coder).unwrap();
        c.start().unwrap();
        let active = c.get_active_agents();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, agent.id);
        assert_eq!(active[0].current_task_id.as_deref(), Some("a"));
    }

    #[test]
    fn pause_then_resume_round_trips_state() {
        let c = coordinator(1);
        c.initialize(ProjectConfig {
            project_id: "p1".to_string(),
            tasks: vec![task("a", &[])],
        })
        .unwrap();
        c.pool.spawn(AgentType::Coder).unwrap();
        c.start().unwrap();
        c.pause().unwrap();
        assert_eq!(c.get_status(), CoordinatorState::Paused);
        c.resume().unwrap();
        assert_eq!(c.get_status(), CoordinatorState::Running);
    }

    #[test]
    fn failed_task_blocks_only_its_dependents() {
        let c = coordinator(2);
        c.initialize(ProjectConfig {
            project_id: "p1".to_string(),
            tasks: vec![task("a", &[]), task("b", &[]), task("c", &["a"])],
        })
        .unwrap();
        let agent_a = c.pool.spawn(AgentType::Coder).unwrap();
        let agent_b = c.pool.spawn(AgentType::Coder).unwrap();
        c.start().unwrap();

        c.report_task_outcome(
            "a",
            agent_a.id,
            crate::pool::ReleaseOutcome::Failed { iterations: 1, tokens: 10 },
            false,
            true,
        );

        let progress = c.get_progress();
        assert_eq!(progress.failed, 1);
        assert_eq!(progress.blocked, 1);
        let _ = agent_b;
    }

    #[test]
    fn wave_advances_once_all_tasks_in_wave_are_terminal() {
        let c = coordinator(1);
        let mut a = task("a", &[]);
        a.wave_id = Some(0);
        let mut b = task("b", &[]);
        b.wave_id = Some(1);
        c.initialize(ProjectConfig {
            project_id: "p1".to_string(),
            tasks: vec![a, b],
        })
        .unwrap();
        let agent = c.pool.spawn(AgentType::Coder).unwrap();
        c.start().unwrap();
        c.report_task_outcome(
            "a",
            agent.id,
            crate::pool::ReleaseOutcome::Completed { iterations: 1, tokens: 10 },
            false,
            false,
        );
        assert_eq!(c.get_progress().current_wave, 1);
    }

    #[test]
    fn all_waves_drained_transitions_to_idle() {
        let c = coordinator(1);
        c.initialize(ProjectConfig {
            project_id: "p1".to_string(),
            tasks: vec![task("a", &[])],
        })
        .unwrap();
        let agent = c.pool.spawn(AgentType::Coder).unwrap();
        c.start().unwrap();
        c.report_task_outcome(
            "a",
            agent.id,
            crate::pool::ReleaseOutcome::Completed { iterations: 1, tokens: 10 },
            false,
            false,
        );
        assert_eq!(c.get_status(), CoordinatorState::Idle);
    }

    #[test]
    fn checkpoint_reflects_completed_and_pending_sets() {
        let c = coordinator(1);
        c.initialize(ProjectConfig {
            project_id: "p1".to_string(),
            tasks: vec![task("a", &[]), task("b", &["a"])],
        })
        .unwrap();
        let agent = c.pool.spawn(AgentType::Coder).unwrap();
        c.start().unwrap();
        c.report_task_outcome(
            "a",
            agent.id,
            crate::pool::ReleaseOutcome::Completed { iterations: 1, tokens: 10 },
            false,
            false,
        );
        let checkpoint = c.create_checkpoint(Some("cp1".to_string()));
        assert_eq!(checkpoint.completed_task_ids, vec!["a".to_string()]);
        assert!(checkpoint.pending_task_ids.contains(&"b".to_string()));
    }
}

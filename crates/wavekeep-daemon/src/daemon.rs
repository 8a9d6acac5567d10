use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tracing::{info, warn};
use uuid::Uuid;

use wavekeep_agents::pool::ReleaseOutcome;
use wavekeep_agents::runner::{
    AgentContext, AgentRunner, CoderProfile, MergerProfile, ReviewerProfile, RunnerOutcome,
    RunnerProfile, TesterProfile,
};
use wavekeep_agents::{AgentPool, Coordinator, ProjectConfig};
use wavekeep_bridge::event_bus::EventBus;
use wavekeep_core::config::Config;
use wavekeep_core::persistence::{CheckpointError, CheckpointStore};
use wavekeep_core::types::{AgentType, CoordinatorState};
use wavekeep_harness::provider::LlmProvider;

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error(transparent)]
    Coordinator(#[from] wavekeep_agents::CoordinatorError),
    #[error(transparent)]
    Pool(#[from] wavekeep_agents::PoolError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

static CODER: CoderProfile = CoderProfile;
static TESTER: TesterProfile = TesterProfile;
static REVIEWER: ReviewerProfile = ReviewerProfile;
static MERGER: MergerProfile = MergerProfile;

/// Planner agents have no conversation-loop profile; they produce the task
/// DAG before the daemon ever starts a run, not during it.
fn profile_for(agent_type: AgentType) -> Option<&'static dyn RunnerProfile> {
    match agent_type {
        AgentType::Coder => Some(&CODER),
        AgentType::Tester => Some(&TESTER),
        AgentType::Reviewer => Some(&REVIEWER),
        AgentType::Merger => Some(&MERGER),
        AgentType::Planner => None,
    }
}

/// A pending run's terminal message, reported back over an mpsc channel so
/// the event loop can `report_task_outcome` without blocking on the runner.
struct TaskDone {
    task_id: String,
    agent_id: Uuid,
    outcome: RunnerOutcome,
    iterations: u32,
    tokens_used: u64,
}

/// Wires `Config`, the `EventBus`, the `AgentPool`, and the `Coordinator`
/// into a single process, and drives the wave pump against a provided
/// `LlmProvider` until the plan drains or a shutdown is requested.
pub struct Daemon {
    config: Config,
    event_bus: EventBus,
    coordinator: Arc<Coordinator>,
    provider: Arc<dyn LlmProvider>,
    checkpoint_store: Arc<dyn CheckpointStore>,
    shutdown: Arc<Notify>,
}

impl Daemon {
    pub fn new(
        config: Config,
        model: impl Into<String>,
        provider: Arc<dyn LlmProvider>,
        checkpoint_store: Arc<dyn CheckpointStore>,
    ) -> Self {
        let event_bus = EventBus::new();
        let pool = AgentPool::new(config.agents.max_parallel_agents as usize, model);
        let coordinator = Arc::new(Coordinator::new(pool, event_bus.clone()));
        Self {
            config,
            event_bus,
            coordinator,
            provider,
            checkpoint_store,
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Returns a handle another task can use to request a graceful pause.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Loads `plan`, spawns `agent_counts` agents of each subtype, starts the
    /// coordinator, and drives the pump loop: every task the coordinator
    /// assigns to an idle agent gets its own `AgentRunner::run` future, whose
    /// terminal outcome is reported back into the coordinator, which in turn
    /// may assign the next ready task. Returns once every wave has drained
    /// (or a shutdown was requested, in which case the coordinator is left
    /// paused rather than stopped, so a later `run` can resume it).
    pub async fn run(
        &self,
        plan: ProjectConfig,
        agent_counts: &[(AgentType, usize)],
    ) -> Result<(), DaemonError> {
        let project_id = plan.project_id.clone();
        self.coordinator.initialize(plan)?;
        for (agent_type, count) in agent_counts {
            for _ in 0..*count {
                self.coordinator.spawn_agent(*agent_type)?;
            }
        }
        self.coordinator.start()?;

        let (tx, mut rx) = mpsc::unbounded_channel::<TaskDone>();
        let mut in_flight: HashSet<String> = HashSet::new();
        self.dispatch_ready_agents(&mut in_flight, &tx);

        let checkpoint_period =
            Duration::from_secs(self.config.general.checkpoint_interval_hours.max(1) as u64 * 3600);
        let mut checkpoint_interval = tokio::time::interval(checkpoint_period);
        checkpoint_interval.tick().await;

        loop {
            if in_flight.is_empty() && self.coordinator.get_status() == CoordinatorState::Idle {
                break;
            }
            tokio::select! {
                Some(done) = rx.recv() => {
                    in_flight.remove(&done.task_id);
                    let (escalated, failed) = match &done.outcome {
                        RunnerOutcome::Success { .. } => (false, false),
                        RunnerOutcome::Escalated { .. } => (true, false),
                        RunnerOutcome::Failed { .. } => (false, true),
                    };
                    let release_outcome = if failed || escalated {
                        ReleaseOutcome::Failed { iterations: done.iterations as u64, tokens: done.tokens_used }
                    } else {
                        ReleaseOutcome::Completed { iterations: done.iterations as u64, tokens: done.tokens_used }
                    };
                    self.coordinator.report_task_outcome(&done.task_id, done.agent_id, release_outcome, escalated, failed);
                    self.dispatch_ready_agents(&mut in_flight, &tx);
                }
                _ = checkpoint_interval.tick() => {
                    if let Err(e) = self.write_checkpoint(&project_id).await {
                        warn!(error = %e, "periodic checkpoint failed");
                    }
                }
                _ = self.shutdown.notified() => {
                    info!("shutdown requested, pausing coordinator");
                    let _ = self.coordinator.pause();
                    break;
                }
            }
        }

        Ok(())
    }

    /// Finds every active agent that has a task assigned but no in-flight
    /// runner yet, and spawns one `AgentRunner::run` task per agent.
    fn dispatch_ready_agents(
        &self,
        in_flight: &mut HashSet<String>,
        tx: &mpsc::UnboundedSender<TaskDone>,
    ) {
        for agent in self.coordinator.get_active_agents() {
            let Some(task_id) = agent.current_task_id.clone() else {
                continue;
            };
            if in_flight.contains(&task_id) {
                continue;
            }
            let Some(profile) = profile_for(agent.agent_type) else {
                warn!(agent_id = %agent.id, "agent has no runner profile, skipping dispatch");
                continue;
            };
            let Some(task) = self.coordinator.get_task(&task_id) else {
                continue;
            };

            in_flight.insert(task_id.clone());
            let provider = self.provider.clone();
            let event_bus = self.event_bus.clone();
            let runner_config = self.config.runner.clone();
            // Model identifier is a property of the injected `LlmProvider`,
            // which is out of scope here (§1); this just labels events.
            let model = agent.model.clone();
            let working_dir = self
                .config
                .general
                .workspace_root
                .clone()
                .unwrap_or_else(|| ".".to_string());
            let agent_id = agent.id;
            let tx = tx.clone();

            tokio::spawn(async move {
                let runner = AgentRunner::new(provider, event_bus, runner_config, model);
                let context = AgentContext {
                    task_id: task.id.clone(),
                    feature_id: None,
                    project_id: String::new(),
                    working_dir,
                    relevant_files: None,
                    previous_attempts: None,
                };
                let result = runner.run(&task, &context, profile).await;
                let outcome = if result.escalated {
                    RunnerOutcome::Escalated {
                        reason: result.reason.clone().unwrap_or_default(),
                    }
                } else if result.success {
                    RunnerOutcome::Success {
                        output: result.output.clone().unwrap_or_default(),
                    }
                } else {
                    RunnerOutcome::Failed {
                        message: result.reason.clone().unwrap_or_default(),
                    }
                };
                let _ = tx.send(TaskDone {
                    task_id: result.task_id,
                    agent_id,
                    outcome,
                    iterations: result.iterations,
                    tokens_used: result.tokens_used,
                });
            });
        }
    }

    async fn write_checkpoint(&self, project_id: &str) -> Result<(), DaemonError> {
        let checkpoint = self.coordinator.create_checkpoint(None);
        self.checkpoint_store.save(&checkpoint).await?;
        info!(project_id, checkpoint_id = %checkpoint.id, "checkpoint written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wavekeep_core::persistence::InMemoryCheckpointStore;
    use wavekeep_core::types::{Task, TaskStatus, TaskType};
    use wavekeep_harness::provider::{ChatRequest, ChatResponse, FinishReason, ProviderError, Usage};

    /// Always answers with the universal completion marker, so every task it
    /// touches finishes on the first iteration regardless of subtype.
    struct InstantCompleteProvider;

    #[async_trait::async_trait]
    impl LlmProvider for InstantCompleteProvider {
        async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: "[TASK_COMPLETE]".to_string(),
                tool_calls: vec![],
                usage: Usage::default(),
                finish_reason: FinishReason::Stop,
            })
        }

        fn name(&self) -> &str {
            "instant-complete"
        }
    }

    fn two_task_plan() -> ProjectConfig {
        let mut a = Task::new("a", "build the thing", 1);
        a.task_type = TaskType::Auto;
        a.status = TaskStatus::Pending;
        let mut b = Task::new("b", "test the thing", 1);
        b.dependencies = vec!["a".to_string()];
        b.status = TaskStatus::Pending;
        b.task_type = TaskType::Auto;
        ProjectConfig {
            project_id: "proj-1".to_string(),
            tasks: vec![a, b],
        }
    }

    fn test_daemon() -> Daemon {
        let mut config = Config::default();
        config.agents.max_parallel_agents = 2;
        Daemon::new(
            config,
            "test-model",
            Arc::new(InstantCompleteProvider),
            Arc::new(InMemoryCheckpointStore::default()),
        )
    }

    #[tokio::test]
    async fn drains_a_two_task_plan_to_completion() {
        let daemon = test_daemon();
        let agent_counts = [(AgentType::Coder, 1), (AgentType::Tester, 1)];
        daemon
            .run(two_task_plan(), &agent_counts)
            .await
            .expect("run should complete");

        let progress = daemon.coordinator.get_progress();
        assert_eq!(progress.completed, 2);
        assert_eq!(progress.failed, 0);
        assert_eq!(progress.escalated, 0);
    }

    #[tokio::test]
    async fn shutdown_pauses_instead_of_draining() {
        let daemon = test_daemon();
        let shutdown = daemon.shutdown_handle();
        shutdown.notify_one();

        let agent_counts = [(AgentType::Coder, 1), (AgentType::Tester, 1)];
        daemon
            .run(two_task_plan(), &agent_counts)
            .await
            .expect("run should return once paused");

        // The notify permit was consumed before any work could finish, so
        // the coordinator should be paused rather than having drained.
        assert_eq!(daemon.coordinator.get_status(), CoordinatorState::Paused);
    }
}

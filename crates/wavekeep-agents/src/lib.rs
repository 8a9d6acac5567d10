//! Agent pool, task queue, and conversation-loop runner (§4.1-§4.4).
//!
//! `Coordinator` drives the wave pump over a `TaskQueue` and an `AgentPool`;
//! `AgentRunner` executes one task's iteration-bounded LLM loop behind a
//! `RunnerProfile` per agent subtype. `AgentStateMachine` models a single
//! agent's lifecycle independent of any task assignment.

pub mod coordinator;
pub mod pool;
pub mod queue;
pub mod runner;
pub mod state_machine;

pub use coordinator::{Coordinator, CoordinatorError, ProjectConfig, Progress};
pub use pool::{AgentPool, PoolError, ReleaseOutcome};
pub use queue::{QueueError, TaskQueue};
pub use runner::{
    AgentContext, AgentRunner, AgentTaskResult, CoderProfile, ConflictSeverity, ConflictType,
    MergeConflict, MergeReport, MergerProfile, ReviewIssue, ReviewReport, ReviewerProfile,
    RunnerMetrics, RunnerOutcome, RunnerProfile, TesterProfile,
};
pub use state_machine::{AgentEvent, AgentState, AgentStateMachine, StateMachineError};

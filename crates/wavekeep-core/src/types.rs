use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// Lifecycle status of a task within a run.
///
/// A task moves `pending -> queued -> assigned -> running -> {completed,
/// failed, escalated}`. `blocked` is a derived, reported-only status for
/// tasks with a failed transitive ancestor; it is never stored as the
/// task's own `status` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Queued,
    Assigned,
    Running,
    Completed,
    Failed,
    Escalated,
    Blocked,
}

impl TaskStatus {
    /// Terminal statuses are final within a run and never transition further.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Escalated
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Auto,
    Checkpoint,
    Tdd,
}

/// A single unit of work in the planner-provided task DAG.
///
/// `dependencies` names other task ids that must reach `Completed` before
/// this task may become `Queued`. `wave_id` is planner-provided when known;
/// the coordinator computes one at load time when absent (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub estimated_minutes: u32,
    pub priority: i32,
    #[serde(default)]
    pub wave_id: Option<u32>,
    pub status: TaskStatus,
    pub task_type: TaskType,
    /// Insertion order, used as the tie-break for equal-priority dequeue.
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(id: impl Into<String>, name: impl Into<String>, priority: i32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            dependencies: Vec::new(),
            files: Vec::new(),
            acceptance_criteria: Vec::new(),
            estimated_minutes: 0,
            priority,
            wave_id: None,
            status: TaskStatus::Pending,
            task_type: TaskType::Auto,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Coder,
    Tester,
    Reviewer,
    Merger,
    Planner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Assigned,
    Running,
    Waiting,
    Error,
    Terminated,
}

/// Cumulative counters the pool updates on release (§4.3).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub total_iterations: u64,
    pub cumulative_tokens: u64,
    pub active_time_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub agent_type: AgentType,
    pub status: AgentStatus,
    pub model: String,
    pub current_task_id: Option<String>,
    pub worktree_path: Option<String>,
    pub metrics: AgentMetrics,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(agent_type: AgentType, model: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            agent_type,
            status: AgentStatus::Idle,
            model: model.into(),
            current_task_id: None,
            worktree_path: None,
            metrics: AgentMetrics::default(),
            created_at: now,
            last_used_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// TaskContext
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfigSummary {
    pub language: String,
    pub framework: Option<String>,
    pub test_framework: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodebaseDocsSummary {
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelevantFile {
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelevantCode {
    pub chunk: CodeChunk,
    pub score: f32,
    #[serde(default)]
    pub highlights: Option<Vec<String>>,
}

/// A per-task, immutable context bundle (§3). `conversation_history` is
/// always empty: it exists only so the shape matches what the runner hands
/// to the LLM transport, never to carry state across builds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskContext {
    pub context_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub task_id: String,
    pub repo_map: String,
    pub codebase_docs: CodebaseDocsSummary,
    pub project_config: ProjectConfigSummary,
    pub relevant_files: Vec<RelevantFile>,
    pub relevant_code: Vec<RelevantCode>,
    pub relevant_memories: Vec<String>,
    #[serde(default)]
    pub conversation_history: Vec<serde_json::Value>,
    pub token_count: u32,
    pub token_budget: u32,
}

impl TaskContext {
    /// Invariant from §3/§8: built contexts never carry history.
    pub fn has_empty_history(&self) -> bool {
        self.conversation_history.is_empty()
    }

    /// Invariant from §3/§8: assembled token count fits the budget.
    pub fn within_budget(&self) -> bool {
        self.token_count <= self.token_budget
    }
}

// ---------------------------------------------------------------------------
// CodeChunk
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Function,
    Class,
    Interface,
    Type,
    Module,
    Block,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeChunk {
    pub id: String,
    pub project_id: String,
    pub file: String,
    /// 1-indexed, inclusive.
    pub start_line: u32,
    pub end_line: u32,
    pub content: String,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub symbols: Vec<String>,
    pub chunk_type: ChunkType,
    pub language: String,
    /// SHA-256 of `content`, hex-encoded.
    pub hash: String,
    #[serde(default)]
    pub complexity: Option<u32>,
    #[serde(default)]
    pub dependencies: Option<Vec<String>>,
    #[serde(default)]
    pub exports: Option<Vec<String>>,
    #[serde(default)]
    pub documentation: Option<String>,
    pub indexed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorState {
    Idle,
    Running,
    Paused,
    Stopping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    pub project_id: String,
    pub wave_id: u32,
    pub completed_task_ids: Vec<String>,
    pub pending_task_ids: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub coordinator_state: CoordinatorState,
    #[serde(default)]
    pub git_commit: Option<String>,
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// Closed event-type enumeration (§4.11). Variants are renamed to their
/// colon-separated wire names so the bus and any persisted log read back
/// exactly the vocabulary the spec names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "coordinator:started")]
    CoordinatorStarted,
    #[serde(rename = "coordinator:paused")]
    CoordinatorPaused,
    #[serde(rename = "coordinator:resumed")]
    CoordinatorResumed,
    #[serde(rename = "coordinator:stopped")]
    CoordinatorStopped,
    #[serde(rename = "wave:started")]
    WaveStarted,
    #[serde(rename = "wave:completed")]
    WaveCompleted,
    #[serde(rename = "task:queued")]
    TaskQueued,
    #[serde(rename = "task:assigned")]
    TaskAssigned,
    #[serde(rename = "task:started")]
    TaskStarted,
    #[serde(rename = "task:completed")]
    TaskCompleted,
    #[serde(rename = "task:failed")]
    TaskFailed,
    #[serde(rename = "task:escalated")]
    TaskEscalated,
    #[serde(rename = "task:blocked")]
    TaskBlocked,
    #[serde(rename = "task:merged")]
    TaskMerged,
    #[serde(rename = "task:merge-failed")]
    TaskMergeFailed,
    #[serde(rename = "agent:spawned")]
    AgentSpawned,
    #[serde(rename = "agent:assigned")]
    AgentAssigned,
    #[serde(rename = "agent:started")]
    AgentStarted,
    #[serde(rename = "agent:progress")]
    AgentProgress,
    #[serde(rename = "agent:idle")]
    AgentIdle,
    #[serde(rename = "agent:error")]
    AgentError,
    #[serde(rename = "agent:terminated")]
    AgentTerminated,
    #[serde(rename = "qa:build-started")]
    QaBuildStarted,
    #[serde(rename = "qa:build-completed")]
    QaBuildCompleted,
    #[serde(rename = "qa:lint-completed")]
    QaLintCompleted,
    #[serde(rename = "qa:test-completed")]
    QaTestCompleted,
    #[serde(rename = "qa:review-completed")]
    QaReviewCompleted,
    #[serde(rename = "qa:loop-completed")]
    QaLoopCompleted,
    #[serde(rename = "checkpoint:created")]
    CheckpointCreated,
    #[serde(rename = "checkpoint:failed")]
    CheckpointFailed,
    #[serde(rename = "system:error")]
    SystemError,
    #[serde(rename = "system:warning")]
    SystemWarning,
    #[serde(rename = "system:checkpoint-restored")]
    SystemCheckpointRestored,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub project_id: Option<String>,
    pub data: serde_json::Value,
}

impl Event {
    pub fn new(event_type: EventType, data: serde_json::Value) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            project_id: None,
            data,
        }
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Progress snapshot (§1B / §4.1 getProgress expansion)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub total_tasks: u64,
    pub completed: u64,
    pub failed: u64,
    pub escalated: u64,
    pub running: u64,
    pub queued: u64,
    pub blocked: u64,
    pub current_wave: u32,
    pub active_agents: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Escalated.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(!TaskStatus::Blocked.is_terminal());
    }

    #[test]
    fn task_new_starts_pending() {
        let t = Task::new("t1", "do the thing", 5);
        assert_eq!(t.status, TaskStatus::Pending);
        assert!(t.dependencies.is_empty());
    }

    #[test]
    fn agent_new_starts_idle() {
        let a = Agent::new(AgentType::Coder, "claude-sonnet-4-20250514");
        assert_eq!(a.status, AgentStatus::Idle);
        assert!(a.current_task_id.is_none());
    }

    #[test]
    fn task_context_invariants() {
        let ctx = TaskContext {
            context_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            task_id: "t1".into(),
            repo_map: String::new(),
            codebase_docs: CodebaseDocsSummary::default(),
            project_config: ProjectConfigSummary::default(),
            relevant_files: Vec::new(),
            relevant_code: Vec::new(),
            relevant_memories: Vec::new(),
            conversation_history: Vec::new(),
            token_count: 100,
            token_budget: 150,
        };
        assert!(ctx.has_empty_history());
        assert!(ctx.within_budget());
    }

    #[test]
    fn event_type_wire_names() {
        let json = serde_json::to_string(&EventType::TaskEscalated).unwrap();
        assert_eq!(json, "\"task:escalated\"");
        let back: EventType = serde_json::from_str("\"wave:completed\"").unwrap();
        assert_eq!(back, EventType::WaveCompleted);
    }

    #[test]
    fn event_serializes_with_tag() {
        let ev = Event::new(EventType::AgentStarted, serde_json::json!({"agentId": "a1"}));
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "agent:started");
    }
}

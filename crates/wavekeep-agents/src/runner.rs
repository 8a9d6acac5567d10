//! Iteration-bounded conversation loop that executes a single task (§4.4).
//!
//! The control flow mirrors the teacher's `execute_task_inner`: spawn
//! (here, seed the message history) → loop feeding the transport → collect
//! structured signals → publish events, with a wall-clock timeout guard.
//! The transport is an injected `LlmProvider` instead of a PTY process.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use wavekeep_bridge::event_bus::EventBus;
use wavekeep_context::TokenCache;
use wavekeep_core::config::RunnerConfig;
use wavekeep_core::types::{Event, EventType, Task};
use wavekeep_harness::provider::{
    ChatMessage, ChatOptions, ChatRequest, ChatResponse, LlmProvider, ProviderError, Role,
    ToolExecutor,
};

// ---------------------------------------------------------------------------
// AgentContext / AgentTaskResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentContext {
    pub task_id: String,
    pub feature_id: Option<String>,
    pub project_id: String,
    pub working_dir: String,
    #[serde(default)]
    pub relevant_files: Option<Vec<String>>,
    #[serde(default)]
    pub previous_attempts: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunnerMetrics {
    pub tool_calls: u32,
    pub llm_errors: u32,
}

/// Terminal outcome of a run, expressed as a tagged result rather than an
/// exception (§9 re-architecture guidance).
#[derive(Debug, Clone)]
pub enum RunnerOutcome {
    Success { output: String },
    Escalated { reason: String },
    Failed { message: String },
}

#[derive(Debug, Clone)]
pub struct AgentTaskResult {
    pub task_id: String,
    pub success: bool,
    pub escalated: bool,
    pub output: Option<String>,
    pub reason: Option<String>,
    pub iterations: u32,
    pub duration: Duration,
    pub tokens_used: u64,
    pub metrics: RunnerMetrics,
}

impl AgentTaskResult {
    fn new(task_id: String, iterations: u32, duration: Duration, tokens_used: u64, metrics: RunnerMetrics) -> Self {
        Self {
            task_id,
            success: false,
            escalated: false,
            output: None,
            reason: None,
            iterations,
            duration,
            tokens_used,
            metrics,
        }
    }

    fn with_outcome(mut self, outcome: RunnerOutcome) -> Self {
        match outcome {
            RunnerOutcome::Success { output } => {
                self.success = true;
                self.output = Some(output);
            }
            RunnerOutcome::Escalated { reason } => {
                self.escalated = true;
                self.reason = Some(reason);
            }
            RunnerOutcome::Failed { message } => {
                self.reason = Some(message);
            }
        }
        self
    }
}

// ---------------------------------------------------------------------------
// RunnerProfile — subtype-specific behavior (Open Question resolution, §9)
// ---------------------------------------------------------------------------

/// No default-method bodies: every subtype supplies its own, and there is
/// no base instance to construct.
pub trait RunnerProfile: Send + Sync {
    fn name(&self) -> &'static str;
    fn system_prompt(&self) -> String;
    fn build_task_prompt(&self, task: &Task, context: &AgentContext) -> String;
    fn continuation_prompt(&self) -> String;
    fn error_recovery_prompt(&self, error: &str) -> String;
    /// Returns `Some(outcome)` if `content` signals completion for this
    /// subtype, per the completion vocabulary table (§4.4).
    fn is_complete(&self, content: &str) -> Option<RunnerOutcome>;
}

const UNIVERSAL_MARKER: &str = "[TASK_COMPLETE]";

fn contains_any(haystack_lower: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| haystack_lower.contains(p))
}

pub struct CoderProfile;

impl RunnerProfile for CoderProfile {
    fn name(&self) -> &'static str {
        "coder"
    }

    fn system_prompt(&self) -> String {
        "You are a coding agent. Implement the task fully and verify it against its acceptance criteria.".to_string()
    }

    fn build_task_prompt(&self, task: &Task, context: &AgentContext) -> String {
        render_task_prompt(task, context)
    }

    fn continuation_prompt(&self) -> String {
        "Continue implementing the task. When every acceptance criterion is satisfied, say so explicitly.".to_string()
    }

    fn error_recovery_prompt(&self, error: &str) -> String {
        format!("The last request failed: {error}. Adjust your approach and continue.")
    }

    fn is_complete(&self, content: &str) -> Option<RunnerOutcome> {
        if content.contains(UNIVERSAL_MARKER) {
            return Some(RunnerOutcome::Success { output: content.to_string() });
        }
        let lower = content.to_lowercase();
        const PHRASES: &[&str] = &[
            "implementation complete",
            "task completed successfully",
            "all acceptance criteria satisfied",
            "implementation is complete",
            "changes have been completed",
            "task has been completed",
        ];
        contains_any(&lower, PHRASES).then(|| RunnerOutcome::Success { output: content.to_string() })
    }
}

pub struct TesterProfile;

impl RunnerProfile for TesterProfile {
    fn name(&self) -> &'static str {
        "tester"
    }

    fn system_prompt(&self) -> String {
        "You are a testing agent. Write thorough tests covering the task's acceptance criteria.".to_string()
    }

    fn build_task_prompt(&self, task: &Task, context: &AgentContext) -> String {
        render_task_prompt(task, context)
    }

    fn continuation_prompt(&self) -> String {
        "Continue writing tests. Announce when coverage is complete.".to_string()
    }

    fn error_recovery_prompt(&self, error: &str) -> String {
        format!("The last request failed: {error}. Adjust your approach and continue.")
    }

    fn is_complete(&self, content: &str) -> Option<RunnerOutcome> {
        if content.contains(UNIVERSAL_MARKER) {
            return Some(RunnerOutcome::Success { output: content.to_string() });
        }
        let lower = content.to_lowercase();
        const PHRASES: &[&str] = &[
            "tests complete",
            "test implementation complete",
            "all tests have been written",
            "testing is complete",
            "test coverage complete",
            "tests are ready",
            "test suite is complete",
        ];
        contains_any(&lower, PHRASES).then(|| RunnerOutcome::Success { output: content.to_string() })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewIssue {
    #[serde(default = "default_severity")]
    pub severity: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_unknown_file")]
    pub file: String,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default = "default_message")]
    pub message: String,
    #[serde(default)]
    pub suggestion: Option<String>,
}

fn default_severity() -> String {
    "minor".to_string()
}
fn default_category() -> String {
    "maintainability".to_string()
}
fn default_unknown_file() -> String {
    "unknown".to_string()
}
fn default_message() -> String {
    "No message".to_string()
}
fn default_summary() -> String {
    "No summary provided".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewReport {
    pub approved: bool,
    #[serde(default)]
    pub issues: Vec<ReviewIssue>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default = "default_summary")]
    pub summary: String,
}

impl ReviewReport {
    /// Independent stricter approval predicate: rejects any review with
    /// >=1 critical issue or >2 major issues, regardless of the LLM's
    /// self-reported `approved` field.
    pub fn strictly_approved(&self) -> bool {
        let critical = self.issues.iter().filter(|i| i.severity == "critical").count();
        let major = self.issues.iter().filter(|i| i.severity == "major").count();
        critical == 0 && major <= 2
    }
}

pub struct ReviewerProfile;

impl RunnerProfile for ReviewerProfile {
    fn name(&self) -> &'static str {
        "reviewer"
    }

    fn system_prompt(&self) -> String {
        "You are a code review agent. Assess the change and report approved/issues/summary as JSON.".to_string()
    }

    fn build_task_prompt(&self, task: &Task, context: &AgentContext) -> String {
        render_task_prompt(task, context)
    }

    fn continuation_prompt(&self) -> String {
        "Continue the review. When finished, present your findings as JSON with `approved` and `summary`.".to_string()
    }

    fn error_recovery_prompt(&self, error: &str) -> String {
        format!("The last request failed: {error}. Adjust your approach and continue.")
    }

    fn is_complete(&self, content: &str) -> Option<RunnerOutcome> {
        if content.contains(UNIVERSAL_MARKER) {
            return Some(RunnerOutcome::Success { output: content.to_string() });
        }
        if let Some(json) = extract_json(content) {
            if json.get("approved").is_some() && json.get("summary").is_some() {
                return Some(RunnerOutcome::Success { output: content.to_string() });
            }
        }
        let lower = content.to_lowercase();
        const PHRASES: &[&str] = &[
            "review complete",
            "code review complete",
            "review is complete",
            "finished reviewing",
            "review summary:",
        ];
        contains_any(&lower, PHRASES).then(|| RunnerOutcome::Success { output: content.to_string() })
    }
}

impl ReviewerProfile {
    /// Parses a reviewer response into a [`ReviewReport`], applying the
    /// field defaults named in §4.4.
    pub fn parse_report(content: &str) -> Option<ReviewReport> {
        let json = extract_json(content)?;
        serde_json::from_value(json).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictSeverity {
    Simple,
    Moderate,
    Complex,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictType {
    Content,
    Rename,
    DeleteModify,
    Semantic,
    Dependency,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeConflict {
    pub file: String,
    #[serde(rename = "type")]
    pub conflict_type: ConflictType,
    pub severity: ConflictSeverity,
    pub description: String,
    pub our_changes: String,
    pub their_changes: String,
    #[serde(default)]
    pub suggested_resolution: Option<String>,
    #[serde(default)]
    pub needs_manual_review: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    pub success: bool,
    #[serde(default)]
    pub conflicts: Vec<MergeConflict>,
    #[serde(default)]
    pub resolutions: Vec<String>,
    #[serde(default)]
    pub unresolved_count: u32,
    #[serde(default = "default_summary")]
    pub summary: String,
    #[serde(default)]
    pub requires_human_review: bool,
}

impl MergeReport {
    /// Auto-completion predicate: true iff every conflict is simple or
    /// moderate, none needs manual review, and none is `delete-modify`.
    pub fn auto_completes(&self) -> bool {
        self.conflicts.iter().all(|c| {
            matches!(c.severity, ConflictSeverity::Simple | ConflictSeverity::Moderate)
                && !c.needs_manual_review
                && !matches!(c.conflict_type, ConflictType::DeleteModify)
        })
    }
}

pub struct MergerProfile;

impl RunnerProfile for MergerProfile {
    fn name(&self) -> &'static str {
        "merger"
    }

    fn system_prompt(&self) -> String {
        "You are a merge-conflict resolution agent. Resolve conflicts and report success/conflicts as JSON.".to_string()
    }

    fn build_task_prompt(&self, task: &Task, context: &AgentContext) -> String {
        render_task_prompt(task, context)
    }

    fn continuation_prompt(&self) -> String {
        "Continue resolving conflicts. Report `success` and `conflicts` as JSON when finished.".to_string()
    }

    fn error_recovery_prompt(&self, error: &str) -> String {
        format!("The last request failed: {error}. Adjust your approach and continue.")
    }

    fn is_complete(&self, content: &str) -> Option<RunnerOutcome> {
        if content.contains(UNIVERSAL_MARKER) {
            return Some(RunnerOutcome::Success { output: content.to_string() });
        }
        if let Some(json) = extract_json(content) {
            if json.get("success").is_some() && json.get("conflicts").is_some() {
                return Some(RunnerOutcome::Success { output: content.to_string() });
            }
        }
        content
            .to_lowercase()
            .contains("merge complete")
            .then(|| RunnerOutcome::Success { output: content.to_string() })
    }
}

impl MergerProfile {
    pub fn parse_report(content: &str) -> Option<MergeReport> {
        let json = extract_json(content)?;
        serde_json::from_value(json).ok()
    }
}

fn render_task_prompt(task: &Task, context: &AgentContext) -> String {
    let mut out = format!("Task: {}\n\n{}\n\nWorking directory: {}", task.name, task.description, context.working_dir);
    if !task.acceptance_criteria.is_empty() {
        out.push_str("\n\nAcceptance criteria:\n");
        for c in &task.acceptance_criteria {
            out.push_str(&format!("- {c}\n"));
        }
    }
    out
}

/// Extracts JSON from (a) a ```json fenced block, (b) any ``` fenced block,
/// or (c) the first top-level balanced `{...}` span, in that order.
fn extract_json(content: &str) -> Option<serde_json::Value> {
    if let Some(fenced) = extract_fenced(content, "```json") {
        if let Ok(v) = serde_json::from_str(&fenced) {
            return Some(v);
        }
    }
    if let Some(fenced) = extract_fenced(content, "```") {
        if let Ok(v) = serde_json::from_str(&fenced) {
            return Some(v);
        }
    }
    if let Some(span) = extract_balanced_braces(content) {
        if let Ok(v) = serde_json::from_str(&span) {
            return Some(v);
        }
    }
    None
}

fn extract_fenced(content: &str, opener: &str) -> Option<String> {
    let start = content.find(opener)? + opener.len();
    let rest = &content[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim().to_string())
}

fn extract_balanced_braces(content: &str) -> Option<String> {
    let start = content.find('{')?;
    let mut depth = 0i32;
    for (offset, ch) in content[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(content[start..start + offset + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

// ---------------------------------------------------------------------------
// AgentRunner
// ---------------------------------------------------------------------------

pub struct AgentRunner {
    provider: Arc<dyn LlmProvider>,
    tool_executor: Option<Arc<dyn ToolExecutor>>,
    event_bus: EventBus,
    cache: Option<TokenCache>,
    config: RunnerConfig,
    model: String,
}

impl AgentRunner {
    pub fn new(provider: Arc<dyn LlmProvider>, event_bus: EventBus, config: RunnerConfig, model: impl Into<String>) -> Self {
        Self {
            provider,
            tool_executor: None,
            event_bus,
            cache: None,
            config,
            model: model.into(),
        }
    }

    pub fn with_tool_executor(mut self, executor: Arc<dyn ToolExecutor>) -> Self {
        self.tool_executor = Some(executor);
        self
    }

    pub fn with_cache(mut self, cache: TokenCache) -> Self {
        self.cache = Some(cache);
        self
    }

    fn publish(&self, event_type: EventType, data: serde_json::Value) {
        self.event_bus.emit(Event::new(event_type, data));
    }

    pub async fn run(&self, task: &Task, context: &AgentContext, profile: &dyn RunnerProfile) -> AgentTaskResult {
        let start = Instant::now();
        let timeout = Duration::from_millis(self.config.timeout_ms);

        self.publish(
            EventType::AgentStarted,
            serde_json::json!({ "taskId": task.id, "subtype": profile.name() }),
        );

        let mut messages = vec![
            ChatMessage::system(profile.system_prompt()),
            ChatMessage::user(profile.build_task_prompt(task, context)),
        ];

        let mut iteration = 0u32;
        let mut tokens_used = 0u64;
        let mut metrics = RunnerMetrics::default();

        while iteration < self.config.max_iterations {
            if start.elapsed() >= timeout {
                self.publish(
                    EventType::TaskEscalated,
                    serde_json::json!({ "taskId": task.id, "reason": "timeout" }),
                );
                return AgentTaskResult::new(task.id.clone(), iteration, start.elapsed(), tokens_used, metrics)
                    .with_outcome(RunnerOutcome::Escalated { reason: "timeout".to_string() });
            }

            iteration += 1;
            self.publish(
                EventType::AgentProgress,
                serde_json::json!({ "taskId": task.id, "action": "iteration", "iteration": iteration }),
            );

            let response = self.next_response(profile.name(), &messages).await;
            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    metrics.llm_errors += 1;
                    warn!(task_id = %task.id, error = %e, "llm call failed, retrying with error recovery prompt");
                    self.publish(
                        EventType::AgentError,
                        serde_json::json!({ "taskId": task.id, "message": e.to_string(), "recoverable": true }),
                    );
                    messages.push(ChatMessage::user(profile.error_recovery_prompt(&e.to_string())));
                    continue;
                }
            };

            tokens_used += response.usage.total_tokens;

            if let Some(outcome) = profile.is_complete(&response.content) {
                return self.finish(task, iteration, start, tokens_used, metrics, outcome);
            }

            if !response.tool_calls.is_empty() {
                if let Some(outcome) = self.dispatch_tools(&response, &mut messages, &mut metrics).await {
                    return self.finish(task, iteration, start, tokens_used, metrics, outcome);
                }
                continue;
            }

            messages.push(ChatMessage::assistant(response.content));
            messages.push(ChatMessage::user(profile.continuation_prompt()));
        }

        self.publish(
            EventType::TaskEscalated,
            serde_json::json!({ "taskId": task.id, "reason": "max_iterations" }),
        );
        AgentTaskResult::new(task.id.clone(), iteration, start.elapsed(), tokens_used, metrics).with_outcome(
            RunnerOutcome::Escalated {
                reason: "Maximum iterations reached".to_string(),
            },
        )
    }

    async fn next_response(&self, subtype: &str, messages: &[ChatMessage]) -> Result<ChatResponse, ProviderError> {
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(subtype, messages, &self.model).await {
                return Ok(cached);
            }
        }
        let request = ChatRequest {
            messages: messages.to_vec(),
            options: ChatOptions::default(),
        };
        let response = self.provider.chat(request).await?;
        if let Some(cache) = &self.cache {
            cache.put(subtype, messages, &self.model, &response).await;
        }
        Ok(response)
    }

    /// Dispatches every tool call in parallel; failures are reported back
    /// to the LLM as textual error payloads and never terminate the loop.
    async fn dispatch_tools(
        &self,
        response: &ChatResponse,
        messages: &mut Vec<ChatMessage>,
        metrics: &mut RunnerMetrics,
    ) -> Option<RunnerOutcome> {
        let Some(executor) = &self.tool_executor else {
            messages.push(ChatMessage::assistant(response.content.clone()));
            messages.push(ChatMessage::user(
                "No tool executor is wired; respond without tool calls.".to_string(),
            ));
            return None;
        };

        messages.push(ChatMessage {
            role: Role::Assistant,
            content: response.content.clone(),
            tool_calls: Some(response.tool_calls.clone()),
            tool_results: None,
        });

        let results = futures_join_all(response.tool_calls.iter().map(|call| {
            let executor = executor.clone();
            let call = call.clone();
            async move {
                let outcome = executor.execute(&call.name, &call.arguments).await;
                (call.id, outcome)
            }
        }))
        .await;

        for (tool_call_id, outcome) in results {
            metrics.tool_calls += 1;
            let text = match outcome {
                Ok(result) => result.result,
                Err(err) => format!("tool call failed: {err}"),
            };
            messages.push(ChatMessage::tool_result(tool_call_id, text));
        }

        None
    }

    fn finish(
        &self,
        task: &Task,
        iteration: u32,
        start: Instant,
        tokens_used: u64,
        metrics: RunnerMetrics,
        outcome: RunnerOutcome,
    ) -> AgentTaskResult {
        match &outcome {
            RunnerOutcome::Success { .. } => {
                info!(task_id = %task.id, iteration, "task completed");
                self.publish(EventType::TaskCompleted, serde_json::json!({ "taskId": task.id }));
            }
            RunnerOutcome::Escalated { reason } => {
                warn!(task_id = %task.id, reason = %reason, "task escalated");
                self.publish(EventType::TaskEscalated, serde_json::json!({ "taskId": task.id, "reason": reason }));
            }
            RunnerOutcome::Failed { message } => {
                error!(task_id = %task.id, message = %message, "task failed");
                self.publish(
                    EventType::AgentError,
                    serde_json::json!({ "taskId": task.id, "message": message, "recoverable": false }),
                );
            }
        }
        AgentTaskResult::new(task.id.clone(), iteration, start.elapsed(), tokens_used, metrics).with_outcome(outcome)
    }
}

/// Small local stand-in for `futures::future::join_all` so this crate does
/// not need to pull in the `futures` crate for a single call site.
async fn futures_join_all<I>(iter: I) -> Vec<<I::Item as std::future::Future>::Output>
where
    I: IntoIterator,
    I::Item: std::future::Future,
{
    let futures: Vec<_> = iter.into_iter().collect();
    let mut out = Vec::with_capacity(futures.len());
    for f in futures {
        out.push(f.await);
    }
    out
}

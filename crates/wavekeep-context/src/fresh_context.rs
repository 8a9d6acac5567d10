//! Assembles a brand-new [`TaskContext`] for every call (§4.5). No
//! invocation shares mutable state with another: each build starts from the
//! task, the injected generators, and nothing else.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use wavekeep_core::config::ContextConfig;
use wavekeep_core::types::{
    CodebaseDocsSummary, ProjectConfigSummary, RelevantCode, RelevantFile, Task, TaskContext,
};

use crate::budget::{TokenBudget, TokenBudgeter};
use crate::memory::MemoryEntry;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("failed to read file {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("code search failed: {0}")]
    Search(String),
}

/// Generates the repo-map slot. Falls back to a minimal structural string
/// when no real generator is wired.
pub trait RepoMapGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Generates the codebase-docs slot.
pub trait CodebaseDocsProvider: Send + Sync {
    fn generate(&self) -> CodebaseDocsSummary;
}

/// The `CodeMemory` dependency of §4.5 step 5: a semantic search over the
/// indexed codebase. Implementations own chunking/embedding/search wiring;
/// this trait only needs the final, scored result.
pub trait CodeMemory: Send + Sync {
    fn search(
        &self,
        query: &str,
        project_id: &str,
        min_relevance: f32,
    ) -> Result<Vec<RelevantCode>, ContextError>;
}

/// Optional memory backend consulted in step 7. Returning an empty vec is
/// equivalent to no backend being wired.
pub trait MemoryProvider: Send + Sync {
    fn relevant(&self, task: &Task) -> Vec<MemoryEntry>;
}

/// Loads file content for the `relevant_files` slot.
pub trait FileLoader: Send + Sync {
    fn load(&self, path: &str) -> Result<String, ContextError>;
}

#[derive(Default)]
struct MinimalRepoMap;
impl RepoMapGenerator for MinimalRepoMap {
    fn generate(&self) -> String {
        "(no repo map generator configured)".to_string()
    }
}

#[derive(Default)]
struct MinimalDocs;
impl CodebaseDocsProvider for MinimalDocs {
    fn generate(&self) -> CodebaseDocsSummary {
        CodebaseDocsSummary::default()
    }
}

/// Per-invocation options for [`FreshContextManager::build_fresh_context`].
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    pub project_id: String,
    pub code_search_query: Option<String>,
    pub min_code_relevance: Option<f32>,
}

pub struct ContextBreakdown {
    pub system_prompt: u32,
    pub repo_map: u32,
    pub codebase_docs: u32,
    pub task_spec: u32,
    pub code_results: u32,
    pub files: u32,
    pub memories: u32,
}

pub struct ValidatedContext {
    pub valid: bool,
    pub breakdown: ContextBreakdown,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

pub struct AgentContextResult {
    pub context: TaskContext,
    pub agent_id: String,
    pub task_id: String,
    pub build_time_ms: u64,
}

/// Builds fresh, history-free [`TaskContext`]s under a token budget, and
/// tracks in-flight contexts per agent so `onTaskComplete`/`onTaskFailed` can
/// purge them.
pub struct FreshContextManager {
    config: ContextConfig,
    budgeter: TokenBudgeter,
    repo_map: Box<dyn RepoMapGenerator>,
    docs: Box<dyn CodebaseDocsProvider>,
    code_memory: Option<Box<dyn CodeMemory>>,
    memory: Option<Box<dyn MemoryProvider>>,
    files: Option<Box<dyn FileLoader>>,
    project_config: ProjectConfigSummary,
    agent_contexts: Mutex<HashMap<String, TaskContext>>,
}

impl FreshContextManager {
    pub fn new(config: ContextConfig) -> Self {
        Self {
            config,
            budgeter: TokenBudgeter::new(),
            repo_map: Box::new(MinimalRepoMap),
            docs: Box::new(MinimalDocs),
            code_memory: None,
            memory: None,
            files: None,
            project_config: ProjectConfigSummary::default(),
            agent_contexts: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_repo_map(mut self, generator: Box<dyn RepoMapGenerator>) -> Self {
        self.repo_map = generator;
        self
    }

    pub fn with_codebase_docs(mut self, provider: Box<dyn CodebaseDocsProvider>) -> Self {
        self.docs = provider;
        self
    }

    pub fn with_code_memory(mut self, memory: Box<dyn CodeMemory>) -> Self {
        self.code_memory = Some(memory);
        self
    }

    pub fn with_memory_backend(mut self, memory: Box<dyn MemoryProvider>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_file_loader(mut self, loader: Box<dyn FileLoader>) -> Self {
        self.files = Some(loader);
        self
    }

    pub fn with_project_config(mut self, project_config: ProjectConfigSummary) -> Self {
        self.project_config = project_config;
        self
    }

    /// Assembles a brand-new [`TaskContext`] for `task`. Every call starts
    /// with an empty conversation history and consumes nothing from any
    /// prior call.
    pub fn build_fresh_context(
        &self,
        task: &Task,
        options: &ContextOptions,
    ) -> Result<TaskContext, ContextError> {
        let budget = self.budgeter.allocate(&self.config);

        let repo_map = self.budgeter.truncate_to_fit(&self.repo_map.generate(), budget.repo_map);
        let docs_summary = self.docs.generate();
        let docs_text = self
            .budgeter
            .truncate_to_fit(&docs_summary.summary, budget.codebase_docs)
            .to_string();
        let task_spec = self.render_task_spec(task, budget.task_spec);

        let relevant_code = self.assemble_code_results(task, options, &budget)?;
        let relevant_files = self.assemble_files(task, &budget)?;
        let relevant_memories = self.assemble_memories(task, &budget);

        let fixed_text_len = repo_map.len() + docs_text.len() + task_spec.len();
        let code_len: usize = relevant_code.iter().map(|c| c.chunk.content.len()).sum();
        let files_len: usize = relevant_files.iter().map(|f| f.content.len()).sum();
        let memories_len: usize = relevant_memories.iter().map(|m| m.len()).sum();
        let token_count = self.budgeter.estimate_tokens(&"x".repeat(
            fixed_text_len + code_len + files_len + memories_len,
        )) + budget.system_prompt;

        Ok(TaskContext {
            context_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            task_id: task.id.clone(),
            repo_map: repo_map.to_string(),
            codebase_docs: CodebaseDocsSummary { summary: docs_text },
            project_config: self.project_config.clone(),
            relevant_files,
            relevant_code,
            relevant_memories,
            conversation_history: Vec::new(),
            token_count,
            token_budget: budget.total,
        })
    }

    fn render_task_spec(&self, task: &Task, budget: u32) -> String {
        let mut spec = format!("# Task: {}\n\n{}\n", task.name, task.description);
        if !task.acceptance_criteria.is_empty() {
            spec.push_str("\nAcceptance criteria:\n");
            for criterion in &task.acceptance_criteria {
                spec.push_str(&format!("- {criterion}\n"));
            }
        }
        self.budgeter.truncate_to_fit(&spec, budget).to_string()
    }

    fn assemble_code_results(
        &self,
        _task: &Task,
        options: &ContextOptions,
        budget: &TokenBudget,
    ) -> Result<Vec<RelevantCode>, ContextError> {
        let (Some(query), Some(memory)) = (&options.code_search_query, &self.code_memory) else {
            return Ok(Vec::new());
        };
        let min_relevance = options
            .min_code_relevance
            .unwrap_or(self.config.min_code_relevance);

        let mut results = memory.search(query, &options.project_id, min_relevance)?;
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let mut kept = Vec::new();
        let mut used = 0u32;
        for result in results {
            let cost = self.budgeter.estimate_tokens(&result.chunk.content);
            if used + cost > budget.code_results {
                break;
            }
            used += cost;
            kept.push(result);
        }
        Ok(kept)
    }

    fn assemble_files(
        &self,
        task: &Task,
        budget: &TokenBudget,
    ) -> Result<Vec<RelevantFile>, ContextError> {
        let Some(loader) = &self.files else {
            return Ok(Vec::new());
        };

        let mut remaining = budget.files;
        let mut out = Vec::new();
        for path in task.files.iter().chain(task.dependencies.iter()) {
            if remaining == 0 {
                break;
            }
            let content = loader.load(path)?;
            let cost = self.budgeter.estimate_tokens(&content);
            if cost <= remaining {
                remaining -= cost;
                out.push(RelevantFile {
                    path: path.clone(),
                    content,
                    truncated: false,
                });
            } else {
                let truncated = self.budgeter.truncate_to_fit(&content, remaining);
                out.push(RelevantFile {
                    path: path.clone(),
                    content: truncated.to_string(),
                    truncated: true,
                });
                remaining = 0;
            }
        }
        Ok(out)
    }

    fn assemble_memories(&self, task: &Task, budget: &TokenBudget) -> Vec<String> {
        let Some(memory) = &self.memory else {
            return Vec::new();
        };

        let mut remaining = budget.memories;
        let mut out = Vec::new();
        for entry in memory.relevant(task) {
            let text = format!("{}: {}", entry.key, entry.value);
            let cost = self.budgeter.estimate_tokens(&text);
            if cost > remaining {
                break;
            }
            remaining -= cost;
            out.push(text);
        }
        out
    }

    /// Per-slot breakdown plus advisory warnings/suggestions (§4.5).
    pub fn validate_context(&self, context: &TaskContext) -> ValidatedContext {
        let mut warnings = Vec::new();
        let mut suggestions = Vec::new();

        if !context.has_empty_history() {
            warnings.push("conversation_history is not empty".to_string());
        }
        if !context.within_budget() {
            warnings.push(format!(
                "token_count {} exceeds token_budget {}",
                context.token_count, context.token_budget
            ));
        }
        if context.relevant_code.is_empty() && context.relevant_files.is_empty() {
            suggestions.push("no code search results or files were attached".to_string());
        }

        let breakdown = ContextBreakdown {
            system_prompt: self.config.system_prompt_tokens,
            repo_map: self.budgeter.estimate_tokens(&context.repo_map),
            codebase_docs: self.budgeter.estimate_tokens(&context.codebase_docs.summary),
            task_spec: self.config.task_spec_tokens,
            code_results: context
                .relevant_code
                .iter()
                .map(|c| self.budgeter.estimate_tokens(&c.chunk.content))
                .sum(),
            files: context
                .relevant_files
                .iter()
                .map(|f| self.budgeter.estimate_tokens(&f.content))
                .sum(),
            memories: context
                .relevant_memories
                .iter()
                .map(|m| self.budgeter.estimate_tokens(m))
                .sum(),
        };

        ValidatedContext {
            valid: context.within_budget(),
            breakdown,
            warnings,
            suggestions,
        }
    }

    /// Builds a context and registers it against `agent_id` so it can later
    /// be purged via `on_task_complete`/`on_task_failed`.
    pub fn prepare_agent_context(
        &self,
        agent_id: &str,
        task: &Task,
        options: &ContextOptions,
    ) -> Result<AgentContextResult, ContextError> {
        let start = std::time::Instant::now();
        let context = self.build_fresh_context(task, options)?;
        let build_time_ms = start.elapsed().as_millis() as u64;

        self.agent_contexts
            .lock()
            .unwrap()
            .insert(agent_id.to_string(), context.clone());

        Ok(AgentContextResult {
            context,
            agent_id: agent_id.to_string(),
            task_id: task.id.clone(),
            build_time_ms,
        })
    }

    pub fn get_agent_context(&self, agent_id: &str) -> Option<TaskContext> {
        self.agent_contexts.lock().unwrap().get(agent_id).cloned()
    }

    pub fn on_task_complete(&self, agent_id: &str, _task_id: &str) {
        self.agent_contexts.lock().unwrap().remove(agent_id);
    }

    pub fn on_task_failed(&self, agent_id: &str, _task_id: &str) {
        self.agent_contexts.lock().unwrap().remove(agent_id);
    }
}

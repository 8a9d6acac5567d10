use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration loaded from `~/.wavekeep/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            agents: AgentsConfig::default(),
            runner: RunnerConfig::default(),
            context: ContextConfig::default(),
            chunking: ChunkingConfig::default(),
            search: SearchConfig::default(),
            embeddings: EmbeddingsConfig::default(),
            daemon: DaemonConfig::default(),
        }
    }
}

impl Config {
    /// Load config from `~/.wavekeep/config.toml`, falling back to
    /// defaults when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Config::default())
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let cfg: Config = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(cfg)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".wavekeep")
            .join("config.toml")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
}

// ---------------------------------------------------------------------------
// general
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_project_name")]
    pub project_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub workspace_root: Option<String>,
    #[serde(default = "default_checkpoint_interval_hours")]
    pub checkpoint_interval_hours: u32,
    #[serde(default = "default_test_coverage_target")]
    pub test_coverage_target: u8,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            project_name: default_project_name(),
            log_level: default_log_level(),
            workspace_root: None,
            checkpoint_interval_hours: default_checkpoint_interval_hours(),
            test_coverage_target: default_test_coverage_target(),
        }
    }
}

fn default_project_name() -> String {
    "wavekeep".into()
}
fn default_log_level() -> String {
    "info".into()
}
fn default_checkpoint_interval_hours() -> u32 {
    2
}
fn default_test_coverage_target() -> u8 {
    80
}

// ---------------------------------------------------------------------------
// agents (AgentPool, §4.3)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    #[serde(default = "default_max_parallel_agents")]
    pub max_parallel_agents: u32,
    #[serde(default = "default_max_task_minutes")]
    pub max_task_minutes: u32,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            max_parallel_agents: default_max_parallel_agents(),
            max_task_minutes: default_max_task_minutes(),
        }
    }
}

fn default_max_parallel_agents() -> u32 {
    4
}
fn default_max_task_minutes() -> u32 {
    30
}

// ---------------------------------------------------------------------------
// runner (AgentRunner, §4.4)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_runner_timeout_ms")]
    pub timeout_ms: u64,
    /// Enables the optional prompt/response content-hash cache (§1B). Off by
    /// default: never a substitute for the completion protocol.
    #[serde(default)]
    pub cache: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            timeout_ms: default_runner_timeout_ms(),
            cache: false,
        }
    }
}

fn default_max_iterations() -> u32 {
    50
}
fn default_runner_timeout_ms() -> u64 {
    1_800_000
}

// ---------------------------------------------------------------------------
// context (TokenBudgeter, §4.6)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_system_prompt_tokens")]
    pub system_prompt_tokens: u32,
    #[serde(default = "default_repo_map_tokens")]
    pub repo_map_tokens: u32,
    #[serde(default = "default_codebase_docs_tokens")]
    pub codebase_docs_tokens: u32,
    #[serde(default = "default_task_spec_tokens")]
    pub task_spec_tokens: u32,
    #[serde(default = "default_reserved_tokens")]
    pub reserved_tokens: u32,
    #[serde(default = "default_min_code_relevance")]
    pub min_code_relevance: f32,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            system_prompt_tokens: default_system_prompt_tokens(),
            repo_map_tokens: default_repo_map_tokens(),
            codebase_docs_tokens: default_codebase_docs_tokens(),
            task_spec_tokens: default_task_spec_tokens(),
            reserved_tokens: default_reserved_tokens(),
            min_code_relevance: default_min_code_relevance(),
        }
    }
}

fn default_max_tokens() -> u32 {
    150_000
}
fn default_system_prompt_tokens() -> u32 {
    2_000
}
fn default_repo_map_tokens() -> u32 {
    2_000
}
fn default_codebase_docs_tokens() -> u32 {
    3_000
}
fn default_task_spec_tokens() -> u32 {
    1_000
}
fn default_reserved_tokens() -> u32 {
    16_000
}
fn default_min_code_relevance() -> f32 {
    0.5
}

// ---------------------------------------------------------------------------
// chunking (CodeChunker, §4.7)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: u32,
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: u32,
    #[serde(default = "default_overlap_size")]
    pub overlap_size: u32,
    #[serde(default = "default_preserve_boundaries")]
    pub preserve_boundaries: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
            min_chunk_size: default_min_chunk_size(),
            overlap_size: default_overlap_size(),
            preserve_boundaries: default_preserve_boundaries(),
        }
    }
}

fn default_max_chunk_size() -> u32 {
    1000
}
fn default_min_chunk_size() -> u32 {
    50
}
fn default_overlap_size() -> u32 {
    50
}
fn default_preserve_boundaries() -> bool {
    true
}

// ---------------------------------------------------------------------------
// search (CodeSearchEngine, §4.9)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_threshold")]
    pub threshold: f32,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
    #[serde(default)]
    pub include_context: bool,
    #[serde(default = "default_search_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_cache_size")]
    pub cache_max_size: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            threshold: default_search_threshold(),
            limit: default_search_limit(),
            include_context: false,
            batch_size: default_search_batch_size(),
            cache_max_size: default_embedding_cache_size(),
        }
    }
}

fn default_search_threshold() -> f32 {
    0.7
}
fn default_search_limit() -> usize {
    10
}
fn default_search_batch_size() -> usize {
    100
}
fn default_embedding_cache_size() -> usize {
    1000
}

// ---------------------------------------------------------------------------
// embeddings (EmbeddingsProvider adapter, §4.10)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub mock_mode: bool,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            mock_mode: false,
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

// ---------------------------------------------------------------------------
// daemon
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_daemon_db_path")]
    pub db_path: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            db_path: default_daemon_db_path(),
        }
    }
}

fn default_daemon_db_path() -> String {
    "~/.wavekeep/wavekeep.db".into()
}

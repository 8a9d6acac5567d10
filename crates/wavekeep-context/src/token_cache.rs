//! Prompt/response content-hash cache for the runner (§1B).
//!
//! Keyed on `(subtype, message list, model)` exactly as SPEC_FULL describes
//! it. Disabled by default via `RunnerConfig::cache`; when on, the runner
//! consults this before each LLM call and stores the response after. It
//! never substitutes for the completion protocol, which always evaluates
//! the (possibly cached) response content identically.

use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use wavekeep_harness::provider::{ChatMessage, ChatResponse, FinishReason, Usage};

#[derive(Debug, Clone)]
struct CacheEntry {
    response: ChatResponse,
    created_at: Instant,
    hit_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenCacheConfig {
    pub max_entries: usize,
    pub ttl_secs: u64,
}

impl Default for TokenCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_lookups: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub total_entries: usize,
    pub tokens_saved: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.total_lookups == 0 {
            return 0.0;
        }
        self.hits as f64 / self.total_lookups as f64
    }
}

fn compute_key(subtype: &str, messages: &[ChatMessage], model: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    subtype.hash(&mut hasher);
    model.hash(&mut hasher);
    for msg in messages {
        format!("{:?}", msg.role).hash(&mut hasher);
        msg.content.hash(&mut hasher);
        if let Some(calls) = &msg.tool_calls {
            for c in calls {
                c.name.hash(&mut hasher);
                c.arguments.hash(&mut hasher);
            }
        }
        if let Some(results) = &msg.tool_results {
            for r in results {
                r.result.hash(&mut hasher);
            }
        }
    }
    hasher.finish()
}

/// Thread-safe content-hash cache over `(subtype, messages, model)`.
#[derive(Clone)]
pub struct TokenCache {
    config: TokenCacheConfig,
    entries: Arc<RwLock<AHashMap<u64, CacheEntry>>>,
    stats: Arc<RwLock<CacheStats>>,
}

impl TokenCache {
    pub fn new(config: TokenCacheConfig) -> Self {
        Self {
            config,
            entries: Arc::new(RwLock::new(AHashMap::new())),
            stats: Arc::new(RwLock::new(CacheStats::default())),
        }
    }

    pub async fn get(
        &self,
        subtype: &str,
        messages: &[ChatMessage],
        model: &str,
    ) -> Option<ChatResponse> {
        let key = compute_key(subtype, messages, model);
        let mut stats = self.stats.write().await;
        stats.total_lookups += 1;

        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(&key) {
            if entry.created_at.elapsed() < Duration::from_secs(self.config.ttl_secs) {
                entry.hit_count += 1;
                stats.hits += 1;
                stats.tokens_saved += entry.response.usage.total_tokens;
                return Some(entry.response.clone());
            }
            entries.remove(&key);
        }
        stats.misses += 1;
        None
    }

    pub async fn put(
        &self,
        subtype: &str,
        messages: &[ChatMessage],
        model: &str,
        response: &ChatResponse,
    ) {
        let key = compute_key(subtype, messages, model);
        let mut entries = self.entries.write().await;
        if entries.len() >= self.config.max_entries {
            self.evict(&mut entries).await;
        }
        entries.insert(
            key,
            CacheEntry {
                response: response.clone(),
                created_at: Instant::now(),
                hit_count: 0,
            },
        );
        let mut stats = self.stats.write().await;
        stats.total_entries = entries.len();
    }

    pub async fn stats(&self) -> CacheStats {
        let mut stats = self.stats.read().await.clone();
        stats.total_entries = self.entries.read().await.len();
        stats
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    async fn evict(&self, entries: &mut AHashMap<u64, CacheEntry>) {
        let ttl = Duration::from_secs(self.config.ttl_secs);
        let before = entries.len();
        entries.retain(|_, e| e.created_at.elapsed() < ttl);
        let expired = before - entries.len();

        if entries.len() >= self.config.max_entries {
            let mut ranked: Vec<(u64, u64, Instant)> = entries
                .iter()
                .map(|(k, v)| (*k, v.hit_count, v.created_at))
                .collect();
            ranked.sort_by(|a, b| a.1.cmp(&b.1).then(a.2.cmp(&b.2)));
            let to_remove = entries.len() - self.config.max_entries / 2;
            for (key, _, _) in ranked.into_iter().take(to_remove) {
                entries.remove(&key);
            }
        }

        let mut stats = self.stats.write().await;
        stats.evictions += expired as u64 + (before - entries.len()) as u64;
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(TokenCacheConfig::default())
    }
}

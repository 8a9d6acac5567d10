//! Cosine-similarity search over stored code chunks (§4.9).

use std::collections::HashMap;
use std::sync::Mutex;

use wavekeep_core::config::SearchConfig;
use wavekeep_core::types::{ChunkType, CodeChunk};

/// Cosine similarity mapped from `[-1,1]` to `[0,1]`. Returns 0 for empty
/// vectors, mismatched lengths, or zero magnitude.
pub fn similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    let raw = (dot / (mag_a * mag_b)).clamp(-1.0, 1.0);
    (raw + 1.0) / 2.0
}

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub project_id: Option<String>,
    pub language: Option<String>,
    pub chunk_types: Option<Vec<ChunkType>>,
    pub file_pattern: Option<String>,
    pub threshold: Option<f32>,
    pub limit: Option<usize>,
    pub include_context: bool,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub chunk: CodeChunk,
    pub score: f32,
    pub highlights: Option<Vec<String>>,
}

/// Simple `*`-glob match: at most one wildcard, matched against the whole
/// string via prefix/suffix comparison.
fn glob_matches(pattern: &str, value: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern == value,
        Some((prefix, suffix)) => value.starts_with(prefix) && value.ends_with(suffix),
    }
}

/// LRU cache over query-text embeddings, keyed by a length-prefixed excerpt
/// of the query so near-identical queries collide predictably.
pub struct EmbeddingCache {
    max_size: usize,
    order: Mutex<Vec<String>>,
    entries: Mutex<HashMap<String, Vec<f32>>>,
}

fn cache_key(query: &str) -> String {
    let excerpt: String = query.chars().take(100).collect();
    format!("{}:{}", query.len(), excerpt)
}

impl EmbeddingCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            order: Mutex::new(Vec::new()),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, query: &str) -> Option<Vec<f32>> {
        let key = cache_key(query);
        let found = self.entries.lock().unwrap().get(&key).cloned();
        if found.is_some() {
            let mut order = self.order.lock().unwrap();
            order.retain(|k| k != &key);
            order.push(key);
        }
        found
    }

    pub fn put(&self, query: &str, embedding: Vec<f32>) {
        let key = cache_key(query);
        let mut entries = self.entries.lock().unwrap();
        let mut order = self.order.lock().unwrap();

        if !entries.contains_key(&key) && entries.len() >= self.max_size {
            if let Some(oldest) = order.first().cloned() {
                entries.remove(&oldest);
                order.retain(|k| k != &oldest);
            }
        }
        order.retain(|k| k != &key);
        order.push(key.clone());
        entries.insert(key, embedding);
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
        self.order.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Performs similarity search against a fixed set of (already-loaded) chunks.
/// Fetching chunks from storage and obtaining query embeddings are the
/// caller's responsibility; this engine is pure scoring + filtering.
pub struct CodeSearchEngine {
    config: SearchConfig,
}

impl CodeSearchEngine {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    pub fn search(
        &self,
        query_text: &str,
        query_embedding: &[f32],
        chunks: &[CodeChunk],
        opts: &SearchOptions,
    ) -> Vec<SearchResult> {
        let threshold = opts.threshold.unwrap_or(self.config.threshold);
        let limit = opts.limit.unwrap_or(self.config.limit);

        let filtered: Vec<&CodeChunk> = chunks
            .iter()
            .filter(|c| c.embedding.as_ref().is_some_and(|e| !e.is_empty()))
            .filter(|c| opts.project_id.as_deref().is_none_or(|p| c.project_id == p))
            .filter(|c| opts.language.as_deref().is_none_or(|l| c.language == l))
            .filter(|c| {
                opts.chunk_types
                    .as_ref()
                    .is_none_or(|types| types.contains(&c.chunk_type))
            })
            .filter(|c| {
                opts.file_pattern
                    .as_deref()
                    .is_none_or(|p| glob_matches(p, &c.file))
            })
            .collect();

        let mut scored: Vec<(usize, &CodeChunk, f32)> = filtered
            .into_iter()
            .enumerate()
            .map(|(idx, c)| {
                let score = similarity(query_embedding, c.embedding.as_ref().unwrap());
                (idx, c, score)
            })
            .filter(|(_, _, score)| *score >= threshold)
            .collect();

        scored.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));
        scored.truncate(limit);

        scored
            .into_iter()
            .map(|(_, chunk, score)| {
                let highlights = if opts.include_context {
                    Some(self.highlights(query_text, &chunk.content))
                } else {
                    None
                };
                SearchResult {
                    chunk: chunk.clone(),
                    score,
                    highlights,
                }
            })
            .collect()
    }

    fn highlights(&self, query: &str, content: &str) -> Vec<String> {
        let terms: Vec<String> = query
            .split_whitespace()
            .filter(|t| t.len() > 2)
            .map(|t| t.to_lowercase())
            .collect();
        if terms.is_empty() {
            return Vec::new();
        }

        content
            .lines()
            .filter(|line| {
                let lower = line.to_lowercase();
                terms.iter().any(|t| lower.contains(t.as_str()))
            })
            .map(|line| line.trim().to_string())
            .take(3)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_with_embedding(id: &str, embedding: Vec<f32>) -> CodeChunk {
        CodeChunk {
            id: id.to_string(),
            project_id: "proj".to_string(),
            file: "src/lib.rs".to_string(),
            start_line: 1,
            end_line: 10,
            content: "fn auth_login() {}".to_string(),
            embedding: Some(embedding),
            symbols: vec!["auth_login".to_string()],
            chunk_type: ChunkType::Function,
            language: "rust".to_string(),
            hash: "h".to_string(),
            complexity: Some(1),
            dependencies: None,
            exports: None,
            documentation: None,
            indexed_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn identical_vectors_score_one() {
        assert!((similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_score_half() {
        assert!((similarity(&[1.0, 0.0], &[0.0, 1.0]) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn antipodal_vectors_score_zero() {
        assert!((similarity(&[1.0, 0.0], &[-1.0, 0.0])).abs() < 1e-6);
    }

    #[test]
    fn mismatched_lengths_score_zero() {
        assert_eq!(similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn search_filters_by_threshold_and_sorts_descending() {
        let engine = CodeSearchEngine::new(SearchConfig {
            threshold: 0.6,
            ..SearchConfig::default()
        });
        let chunks = vec![
            chunk_with_embedding("a", vec![1.0, 0.0]),
            chunk_with_embedding("b", vec![0.0, 1.0]),
            chunk_with_embedding("c", vec![0.9, 0.1]),
        ];
        let results = engine.search("auth", &[1.0, 0.0], &chunks, &SearchOptions::default());
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.id, "a");
        assert!(results[0].score >= results[1].score);
    }

    #[test]
    fn chunks_without_embeddings_are_excluded() {
        let engine = CodeSearchEngine::new(SearchConfig::default());
        let mut c = chunk_with_embedding("a", vec![]);
        c.embedding = None;
        let results = engine.search("x", &[1.0, 0.0], &[c], &SearchOptions::default());
        assert!(results.is_empty());
    }

    #[test]
    fn embedding_cache_evicts_oldest_when_full() {
        let cache = EmbeddingCache::new(2);
        cache.put("a", vec![1.0]);
        cache.put("b", vec![2.0]);
        cache.put("c", vec![3.0]);
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn include_context_yields_up_to_three_highlights() {
        let engine = CodeSearchEngine::new(SearchConfig::default());
        let mut chunk = chunk_with_embedding("a", vec![1.0, 0.0]);
        chunk.content = "fn auth_login() {\nlet token = auth_token();\nAuth check here\nother\n}".to_string();
        let opts = SearchOptions {
            include_context: true,
            threshold: Some(0.0),
            ..SearchOptions::default()
        };
        let results = engine.search("auth token", &[1.0, 0.0], &[chunk], &opts);
        let highlights = results[0].highlights.as_ref().unwrap();
        assert!(highlights.len() <= 3);
        assert!(highlights.iter().any(|h| h.to_lowercase().contains("auth")));
    }
}

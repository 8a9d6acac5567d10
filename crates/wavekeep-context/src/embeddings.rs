//! Adapter around [`EmbeddingsProvider`] (§4.10): adds a content-hash cache,
//! exponential-backoff retry on rate limiting, and a deterministic mock mode
//! for fixtures that need exact-match scores without a network dependency.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::warn;
use wavekeep_core::config::EmbeddingsConfig;
use wavekeep_harness::provider::{EmbeddingsProvider, ProviderError};

fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Deterministic fixed-dimension vector derived from a content hash, used in
/// `mock_mode` so the same text always produces the same embedding.
fn mock_vector(hash: &str) -> Vec<f32> {
    const DIM: usize = 16;
    let bytes = hash.as_bytes();
    (0..DIM)
        .map(|i| {
            let b = bytes[i % bytes.len()] as f32;
            (b / 255.0) * 2.0 - 1.0
        })
        .collect()
}

/// Wraps an injected [`EmbeddingsProvider`] with caching, retry, and mock
/// behavior. Cache entries are keyed on the SHA-256 of the input text so
/// identical content never hits the transport twice.
pub struct CachingEmbeddingsProvider<P: EmbeddingsProvider> {
    inner: P,
    config: EmbeddingsConfig,
    cache: Mutex<HashMap<String, Vec<f32>>>,
}

impl<P: EmbeddingsProvider> CachingEmbeddingsProvider<P> {
    pub fn new(inner: P, config: EmbeddingsConfig) -> Self {
        Self {
            inner,
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let hash = content_hash(text);
        if let Some(cached) = self.cache.lock().unwrap().get(&hash).cloned() {
            return Ok(cached);
        }

        let vector = if self.config.mock_mode {
            mock_vector(&hash)
        } else {
            self.embed_with_retry(text).await?
        };

        self.cache.lock().unwrap().insert(hash, vector.clone());
        Ok(vector)
    }

    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    async fn embed_with_retry(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut attempt = 0;
        loop {
            match self.inner.embed(text).await {
                Ok(v) => return Ok(v),
                Err(ProviderError::RateLimited { retry_after_ms }) if attempt < self.config.max_retries => {
                    let backoff = Duration::from_secs(2u64.pow(attempt));
                    warn!(
                        attempt,
                        retry_after_ms, "embeddings provider rate limited, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// Number of distinct content hashes currently cached.
    pub fn cache_len(&self) -> usize {
        self.cache.lock().unwrap().len()
    }

    pub fn clear_cache(&self) {
        self.cache.lock().unwrap().clear();
    }
}

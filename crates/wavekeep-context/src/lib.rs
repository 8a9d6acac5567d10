//! Fresh per-task context assembly over a semantic code index (§4.5-§4.10).
//!
//! Every other module here feeds `fresh_context::FreshContextManager`:
//! `budget` allocates the token split, `chunker` turns files into
//! `CodeChunk`s, `search` scores them against a query embedding,
//! `embeddings` wraps the injected transport with caching/retry, and
//! `memory` is the optional relational memory backend consulted last.

pub mod budget;
pub mod chunker;
pub mod embeddings;
pub mod fresh_context;
pub mod memory;
pub mod search;
pub mod token_cache;

pub use budget::{TokenBudget, TokenBudgeter};
pub use chunker::{CodeChunker, Symbol, SymbolKind};
pub use embeddings::CachingEmbeddingsProvider;
pub use fresh_context::{ContextError, ContextOptions, FreshContextManager};
pub use search::{similarity, CodeSearchEngine, EmbeddingCache, SearchOptions, SearchResult};
pub use token_cache::{TokenCache, TokenCacheConfig};

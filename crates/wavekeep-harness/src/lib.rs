//! External interface contracts (§6): the LLM transport, tool execution, and
//! embeddings traits that `wavekeep-agents` and `wavekeep-context` are built
//! against. This crate defines the seams; it implements none of the
//! providers on the other side of them.

pub mod provider;

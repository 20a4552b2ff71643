//! Similarity-search abstraction.
//!
//! The [`VectorIndex`] trait is the seam to the external vector store that
//! executes similarity search. The orchestrator hands it a
//! [`ChunkPredicate`] to apply as a pre-filter and a candidate limit, and
//! gets back raw hits in whatever order the backend produced them.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::filter::ChunkPredicate;
use crate::models::Chunk;

/// A candidate chunk returned from similarity search, before any
/// hierarchy-aware adjustment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawHit {
    pub chunk: Chunk,
    /// Raw similarity from the backend (cosine for the in-memory index).
    pub similarity: f64,
}

/// Abstract similarity-search backend.
///
/// All operations are async (via `async-trait`) so network-backed stores
/// fit behind the same interface. In-memory implementations return
/// immediately-ready futures.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Return up to `limit` chunks matching `filter`, most similar to
    /// `query_vec` first.
    ///
    /// Errors are propagated to the caller unchanged; the orchestrator does
    /// not retry.
    async fn similarity_search(
        &self,
        query_vec: &[f32],
        limit: usize,
        filter: &ChunkPredicate,
    ) -> Result<Vec<RawHit>>;
}

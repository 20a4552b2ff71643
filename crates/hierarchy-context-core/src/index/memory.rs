//! In-memory [`VectorIndex`] implementation for testing and small corpora.
//!
//! Uses a `Vec` behind `std::sync::RwLock` for thread safety. Search is
//! brute-force cosine similarity over every stored vector that passes the
//! predicate.

use std::sync::{PoisonError, RwLock};

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::filter::ChunkPredicate;
use crate::models::Chunk;
use crate::proximity::cmp_desc;

use super::{RawHit, VectorIndex};

#[derive(Debug)]
struct StoredChunk {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// In-memory index keyed by `embedding_handle`.
#[derive(Debug)]
pub struct InMemoryIndex {
    dims: RwLock<Option<usize>>,
    chunks: RwLock<Vec<StoredChunk>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            dims: RwLock::new(None),
            chunks: RwLock::new(Vec::new()),
        }
    }

    /// Insert or replace a chunk and its vector.
    ///
    /// The first vector fixes the index dimensionality; later vectors of a
    /// different length are rejected.
    pub fn upsert(&self, chunk: Chunk, vector: Vec<f32>) -> Result<()> {
        if vector.is_empty() {
            bail!("empty embedding for chunk {}", chunk.embedding_handle);
        }
        {
            let mut dims = self.dims.write().unwrap_or_else(PoisonError::into_inner);
            match *dims {
                Some(d) if d != vector.len() => bail!(
                    "embedding for chunk {} has {} dims, index has {}",
                    chunk.embedding_handle,
                    vector.len(),
                    d
                ),
                Some(_) => {}
                None => *dims = Some(vector.len()),
            }
        }

        let mut chunks = self.chunks.write().unwrap_or_else(PoisonError::into_inner);
        chunks.retain(|sc| sc.chunk.embedding_handle != chunk.embedding_handle);
        chunks.push(StoredChunk { chunk, vector });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.chunks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dims(&self) -> Option<usize> {
        *self.dims.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn similarity_search(
        &self,
        query_vec: &[f32],
        limit: usize,
        filter: &ChunkPredicate,
    ) -> Result<Vec<RawHit>> {
        if let Some(d) = self.dims() {
            if d != query_vec.len() {
                bail!(
                    "query embedding has {} dims, index has {}",
                    query_vec.len(),
                    d
                );
            }
        }

        let chunks = self.chunks.read().unwrap_or_else(PoisonError::into_inner);
        let mut hits: Vec<RawHit> = chunks
            .iter()
            .filter(|sc| filter.matches(&sc.chunk))
            .map(|sc| RawHit {
                chunk: sc.chunk.clone(),
                similarity: cosine_similarity(query_vec, &sc.vector) as f64,
            })
            .collect();
        hits.sort_by(|a, b| {
            cmp_desc(a.similarity, b.similarity)
                .then(a.chunk.embedding_handle.cmp(&b.chunk.embedding_handle))
        });
        hits.truncate(limit);
        Ok(hits)
    }
}

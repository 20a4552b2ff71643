//! Retrieval orchestrator: scoped filter → similarity search → proximity
//! re-rank.
//!
//! The orchestrator operates entirely through the [`VectorIndex`] trait.
//! The calling application is responsible for embedding the query text and
//! constructing the [`ScopeQuery`].
//!
//! # Algorithm
//!
//! 1. Build the [`ChunkPredicate`](crate::filter::ChunkPredicate) from the
//!    query and pass it to the index as a pre-filter.
//! 2. Request `2 × top_k` candidates when proximity boosting is on (a boost
//!    can promote a hit ranked just below the raw cut-off), else `top_k`.
//! 3. Apply the proximity scorer against the scope when boosting is on;
//!    otherwise keep raw similarity.
//! 4. Sort deterministically and truncate to `top_k`.
//!
//! A failing index call fails the whole search. There is no retry and no
//! empty-result fallback.

use serde::Serialize;
use thiserror::Error;

use crate::filter::build_predicate;
use crate::index::VectorIndex;
use crate::models::ScopeQuery;
use crate::proximity::{rank, ScoredHit};

/// Candidate over-fetch multiplier used when proximity boosting is on.
pub const OVERFETCH_FACTOR: usize = 2;

/// Errors surfaced by [`search`].
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("vector index query failed: {0:#}")]
    Index(#[source] anyhow::Error),
}

/// Result of a scoped search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<ScoredHit>,
    /// Normalized scope actually applied, if any.
    pub scope_used: Option<String>,
    pub ancestors_included: bool,
    /// True only when boosting was requested and a scope was set.
    pub proximity_boost_applied: bool,
    /// Number of raw hits returned by the index.
    pub candidates_considered: usize,
}

/// Number of raw candidates to request for a query.
pub fn candidate_limit(query: &ScopeQuery) -> usize {
    if query.proximity_boost {
        query.top_k.saturating_mul(OVERFETCH_FACTOR)
    } else {
        query.top_k
    }
}

/// Run a scoped similarity search against a [`VectorIndex`] backend.
pub async fn search<I>(
    index: &I,
    query_vec: &[f32],
    query: &ScopeQuery,
) -> Result<SearchResponse, RetrievalError>
where
    I: VectorIndex + ?Sized,
{
    if query.top_k == 0 {
        return Err(RetrievalError::InvalidQuery("top_k must be >= 1".into()));
    }
    if query_vec.is_empty() {
        return Err(RetrievalError::InvalidQuery(
            "query embedding is empty".into(),
        ));
    }

    let predicate = build_predicate(query);
    let limit = candidate_limit(query);

    let raw_hits = index
        .similarity_search(query_vec, limit, &predicate)
        .await
        .map_err(RetrievalError::Index)?;
    let candidates_considered = raw_hits.len();

    let scope_used = predicate.scope.clone();
    let boost_scope = if query.proximity_boost {
        scope_used.as_deref()
    } else {
        None
    };
    let results = rank(raw_hits, boost_scope, query.top_k);

    tracing::debug!(
        scope = scope_used.as_deref().unwrap_or(""),
        candidates = candidates_considered,
        returned = results.len(),
        "scoped search complete"
    );

    Ok(SearchResponse {
        results,
        proximity_boost_applied: boost_scope.is_some(),
        ancestors_included: query.include_ancestors,
        scope_used,
        candidates_considered,
    })
}

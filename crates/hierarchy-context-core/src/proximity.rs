//! Proximity scorer: re-ranks raw similarity hits by hierarchical closeness.
//!
//! # Formula
//!
//! ```text
//! proximity = common_prefix(scope, path) / max(|scope|, |path|)   ∈ [0, 1]
//! boost     = 0.5 + 0.5 × proximity                                ∈ [0.5, 1]
//! adjusted  = similarity × boost
//! ```
//!
//! The 0.5 floor keeps distant but highly similar hits in play. Without a
//! scope every hit keeps its raw similarity.
//!
//! # Ordering
//!
//! Adjusted score (desc), then raw similarity (desc), then hierarchy depth
//! (asc), then hierarchy path (asc). The final key makes the order total, so
//! equal inputs always rank identically.

use std::cmp::Ordering;

use serde::Serialize;

use crate::index::RawHit;
use crate::models::{common_prefix_len, path_segments, Chunk};

/// Lower bound of the boost factor.
pub const BOOST_FLOOR: f64 = 0.5;

/// A hit after proximity adjustment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredHit {
    pub chunk: Chunk,
    /// Raw similarity from the index.
    pub similarity: f64,
    /// Path-prefix closeness to the scope; `1.0` when no scope was given.
    pub proximity: f64,
    pub boost_factor: f64,
    /// `similarity × boost_factor`; the ranking score.
    pub score: f64,
}

/// Path-prefix closeness of `path` to `scope`, in `[0, 1]`.
///
/// Two empty paths are identical (`1.0`).
pub fn proximity(scope: &str, path: &str) -> f64 {
    let scope_segs = path_segments(scope);
    let path_segs = path_segments(path);
    let longest = scope_segs.len().max(path_segs.len());
    if longest == 0 {
        return 1.0;
    }
    let common = common_prefix_len(&scope_segs, &path_segs);
    (common as f64 / longest as f64).clamp(0.0, 1.0)
}

/// Multiplier applied to similarity for a given proximity.
pub fn boost_factor(proximity: f64) -> f64 {
    BOOST_FLOOR + (1.0 - BOOST_FLOOR) * proximity.clamp(0.0, 1.0)
}

/// Adjust every hit's score against `scope`. Order is preserved; see
/// [`rank`] for sorting.
pub fn score(raw_hits: Vec<RawHit>, scope: Option<&str>) -> Vec<ScoredHit> {
    let scope = scope.filter(|s| !path_segments(s).is_empty());
    raw_hits
        .into_iter()
        .map(|hit| {
            let (proximity, boost) = match scope {
                Some(scope) => {
                    let p = proximity(scope, &hit.chunk.hierarchy_path);
                    (p, boost_factor(p))
                }
                None => (1.0, 1.0),
            };
            ScoredHit {
                score: hit.similarity * boost,
                similarity: hit.similarity,
                proximity,
                boost_factor: boost,
                chunk: hit.chunk,
            }
        })
        .collect()
}

/// Descending order on scores. NaN sorts after every number.
pub fn cmp_desc(a: f64, b: f64) -> Ordering {
    let key = |x: f64| if x.is_nan() { f64::NEG_INFINITY } else { x };
    key(b).total_cmp(&key(a))
}

/// Deterministic result ordering: best first.
pub fn compare_hits(a: &ScoredHit, b: &ScoredHit) -> Ordering {
    cmp_desc(a.score, b.score)
        .then(cmp_desc(a.similarity, b.similarity))
        .then(a.chunk.hierarchy_depth.cmp(&b.chunk.hierarchy_depth))
        .then(a.chunk.hierarchy_path.cmp(&b.chunk.hierarchy_path))
}

/// Score, sort, and truncate to `top_k`.
pub fn rank(raw_hits: Vec<RawHit>, scope: Option<&str>, top_k: usize) -> Vec<ScoredHit> {
    let mut scored = score(raw_hits, scope);
    scored.sort_by(compare_hits);
    scored.truncate(top_k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeType;

    fn hit(path: &str, similarity: f64) -> RawHit {
        RawHit {
            chunk: Chunk {
                content: String::new(),
                embedding_handle: path.to_string(),
                hierarchy_path: path.to_string(),
                hierarchy_depth: path_segments(path).len(),
                node_type: NodeType::for_depth(path_segments(path).len()),
                tags: Vec::new(),
                phase: None,
                client: None,
            },
            similarity,
        }
    }

    fn paths(hits: &[ScoredHit]) -> Vec<&str> {
        hits.iter().map(|h| h.chunk.hierarchy_path.as_str()).collect()
    }

    #[test]
    fn test_worked_scenario() {
        let hits = vec![hit("a/b/c", 0.70), hit("a/b", 0.95), hit("a/x", 0.94)];
        let ranked = rank(hits, Some("a/b/c"), 10);

        assert_eq!(paths(&ranked), vec!["a/b", "a/b/c", "a/x"]);

        let by_path = |p: &str| ranked.iter().find(|h| h.chunk.hierarchy_path == p).unwrap();
        assert!((by_path("a/b/c").proximity - 1.0).abs() < 1e-9);
        assert!((by_path("a/b").proximity - 2.0 / 3.0).abs() < 1e-9);
        assert!((by_path("a/x").proximity - 1.0 / 3.0).abs() < 1e-9);

        assert!((by_path("a/b/c").score - 0.70).abs() < 1e-3);
        assert!((by_path("a/b").score - 0.792).abs() < 1e-3);
        assert!((by_path("a/x").score - 0.627).abs() < 1e-3);
    }

    #[test]
    fn test_no_scope_is_neutral() {
        let scored = score(vec![hit("a/b", 0.4), hit("z", 0.9)], None);
        for h in &scored {
            assert_eq!(h.score, h.similarity);
            assert_eq!(h.boost_factor, 1.0);
        }
        let scored = score(vec![hit("a/b", 0.4)], Some("/"));
        assert_eq!(scored[0].score, 0.4);
    }

    #[test]
    fn test_boost_bounds() {
        assert_eq!(boost_factor(0.0), 0.5);
        assert_eq!(boost_factor(1.0), 1.0);
        assert_eq!(boost_factor(7.0), 1.0);
        assert_eq!(boost_factor(-1.0), 0.5);
        assert_eq!(proximity("a/b", "x/y"), 0.0);
        assert_eq!(proximity("", ""), 1.0);
    }

    #[test]
    fn test_proximity_monotonic_in_common_prefix() {
        let scope = "c/p/s/m";
        let candidates = ["x", "c", "c/p", "c/p/s", "c/p/s/m"];
        let scored = score(candidates.iter().map(|p| hit(p, 0.8)).collect(), Some(scope));
        for pair in scored.windows(2) {
            assert!(
                pair[1].score >= pair[0].score,
                "{} scored below {}",
                pair[1].chunk.hierarchy_path,
                pair[0].chunk.hierarchy_path
            );
        }
    }

    #[test]
    fn test_boost_can_reorder_raw_ranking() {
        // a/x: 0.8 × 2/3 ≈ 0.533 falls below a/b/c at 0.6.
        let ranked = rank(vec![hit("a/x", 0.8), hit("a/b/c", 0.6)], Some("a/b/c"), 10);
        assert_eq!(paths(&ranked), vec!["a/b/c", "a/x"]);
    }

    #[test]
    fn test_tie_breaks_depth_then_path() {
        let ranked = rank(vec![hit("q/r/s", 0.5), hit("q/r", 0.5)], None, 10);
        assert_eq!(paths(&ranked), vec!["q/r", "q/r/s"]);

        let ranked = rank(vec![hit("b/a", 0.5), hit("a/z", 0.5)], None, 10);
        assert_eq!(paths(&ranked), vec!["a/z", "b/a"]);
    }

    #[test]
    fn test_equal_adjusted_score_prefers_raw_similarity() {
        let a = ScoredHit {
            chunk: hit("a", 0.0).chunk,
            similarity: 0.6,
            proximity: 1.0,
            boost_factor: 1.0,
            score: 0.6,
        };
        let b = ScoredHit {
            chunk: hit("b", 0.0).chunk,
            similarity: 0.9,
            proximity: 1.0 / 3.0,
            boost_factor: 2.0 / 3.0,
            score: 0.6,
        };
        assert_eq!(compare_hits(&b, &a), Ordering::Less);
    }

    #[test]
    fn test_nan_similarity_sorts_last_in_any_input_order() {
        let forward = vec![hit("a/nan", f64::NAN), hit("a/b", 0.5), hit("a/c", 0.9)];
        let backward = vec![hit("a/c", 0.9), hit("a/b", 0.5), hit("a/nan", f64::NAN)];
        let first = rank(forward, Some("a"), 10);
        let second = rank(backward, Some("a"), 10);
        assert_eq!(paths(&first), vec!["a/c", "a/b", "a/nan"]);
        assert_eq!(paths(&first), paths(&second));
    }

    #[test]
    fn test_cmp_desc() {
        assert_eq!(cmp_desc(0.9, 0.1), Ordering::Less);
        assert_eq!(cmp_desc(0.1, 0.9), Ordering::Greater);
        assert_eq!(cmp_desc(f64::NAN, -1.0), Ordering::Greater);
        assert_eq!(cmp_desc(f64::NAN, f64::NAN), Ordering::Equal);
    }

    #[test]
    fn test_rank_truncates() {
        let hits = (0..10).map(|i| hit(&format!("c/{}", i), i as f64 / 10.0)).collect();
        let ranked = rank(hits, Some("c"), 3);
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].chunk.hierarchy_path, "c/9");
    }
}

//! Scoped query filter.
//!
//! [`build_predicate`] turns a [`ScopeQuery`] into a [`ChunkPredicate`]: a
//! plain value that can be evaluated in-process with
//! [`ChunkPredicate::matches`] or inspected field by field by a vector-store
//! adapter that translates it into its own filter language.
//!
//! All active dimensions are ANDed. Within `tags` and `node_types` a chunk
//! matches if it carries any of the listed values.
//!
//! # Scope matching
//!
//! Paths compare segment-wise, so `rescue/erp` is never a prefix of
//! `rescue/erpnext`.
//!
//! | `include_ancestors` | Scope `rescue/erp` matches |
//! |---------------------|----------------------------|
//! | `true` | `rescue`, `rescue/erp`, `rescue/erp/**` |
//! | `false` | `rescue/erp/**` only |

use crate::models::{
    common_prefix_len, path_segments, Chunk, MilestoneAncestorPolicy, NodeType, ScopeQuery,
};

/// Where a chunk sits relative to a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeRelation {
    /// Strictly above the scope.
    Ancestor,
    /// The scope itself.
    Same,
    /// Strictly below the scope.
    Descendant,
    /// On another branch.
    Unrelated,
}

/// Classify `path` relative to `scope`.
pub fn scope_relation(scope: &str, path: &str) -> ScopeRelation {
    let scope_segs = path_segments(scope);
    let path_segs = path_segments(path);
    let common = common_prefix_len(&scope_segs, &path_segs);

    if common == scope_segs.len() && common == path_segs.len() {
        ScopeRelation::Same
    } else if common == scope_segs.len() {
        ScopeRelation::Descendant
    } else if common == path_segs.len() {
        ScopeRelation::Ancestor
    } else {
        ScopeRelation::Unrelated
    }
}

/// A match predicate over chunk metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPredicate {
    pub client: Option<String>,
    /// Normalized scope path (no leading or trailing separators).
    pub scope: Option<String>,
    pub include_ancestors: bool,
    pub milestone_ancestors: MilestoneAncestorPolicy,
    pub phase: Option<String>,
    pub tags: Vec<String>,
    pub node_types: Vec<NodeType>,
}

impl ChunkPredicate {
    /// A predicate that accepts every chunk.
    pub fn accept_all() -> Self {
        Self {
            client: None,
            scope: None,
            include_ancestors: true,
            milestone_ancestors: MilestoneAncestorPolicy::Include,
            phase: None,
            tags: Vec::new(),
            node_types: Vec::new(),
        }
    }

    /// Evaluate the predicate against one chunk.
    pub fn matches(&self, chunk: &Chunk) -> bool {
        if let Some(client) = &self.client {
            if chunk.client() != Some(client.as_str()) {
                return false;
            }
        }

        if let Some(scope) = &self.scope {
            if !self.scope_matches(scope, chunk) {
                return false;
            }
        }

        if let Some(phase) = &self.phase {
            if chunk.phase.as_deref() != Some(phase.as_str()) {
                return false;
            }
        }

        if !self.tags.is_empty() && !chunk.tags.iter().any(|t| self.tags.contains(t)) {
            return false;
        }

        if !self.node_types.is_empty() && !self.node_types.contains(&chunk.node_type) {
            return false;
        }

        true
    }

    fn scope_matches(&self, scope: &str, chunk: &Chunk) -> bool {
        match scope_relation(scope, &chunk.hierarchy_path) {
            ScopeRelation::Descendant => true,
            ScopeRelation::Same => self.include_ancestors,
            ScopeRelation::Ancestor => {
                self.include_ancestors
                    && !(chunk.node_type == NodeType::Milestone
                        && self.milestone_ancestors == MilestoneAncestorPolicy::Exclude)
            }
            ScopeRelation::Unrelated => false,
        }
    }
}

/// Build the match predicate for a query.
///
/// Empty strings and empty lists are treated as unset.
pub fn build_predicate(query: &ScopeQuery) -> ChunkPredicate {
    ChunkPredicate {
        client: query.client.clone().filter(|c| !c.is_empty()),
        scope: query.effective_scope().map(str::to_string),
        include_ancestors: query.include_ancestors,
        milestone_ancestors: query.milestone_ancestors,
        phase: query.phase.clone().filter(|p| !p.is_empty()),
        tags: query.tags.clone().unwrap_or_default(),
        node_types: query.node_types.clone().unwrap_or_default(),
    }
}

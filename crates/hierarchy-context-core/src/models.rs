//! Core data types shared by the resolution and retrieval paths.
//!
//! Context resolution works on [`ContextFile`] records folded into an
//! [`EffectiveContext`]; retrieval works on [`Chunk`] metadata filtered and
//! ranked according to a [`ScopeQuery`]. Both sides share the hierarchy path
//! model: `/`-separated segments rooted at a client directory.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Separator used by hierarchy paths and node ids.
pub const PATH_SEPARATOR: char = '/';

/// Section marker requesting full replacement of inherited content.
pub const OVERRIDE_MARKER: &str = "@override";

/// Settings key requesting concatenation instead of replacement.
pub const ADDITIVE_KEY: &str = "@additive";

/// Node id of the global context file placed at chain position 0.
pub const GLOBAL_NODE_ID: &str = "global";

/// Position of a node in the client hierarchy.
///
/// A closed set: depth supplies the default, front-matter `type` may
/// override it, nothing else is inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Client,
    Project,
    SubProject,
    Milestone,
}

impl NodeType {
    /// Default type for a directory `depth` levels below the clients root.
    ///
    /// Depth 0 (the root itself) and 1 are both treated as clients.
    pub fn for_depth(depth: usize) -> Self {
        match depth {
            0 | 1 => NodeType::Client,
            2 => NodeType::Project,
            3 => NodeType::SubProject,
            _ => NodeType::Milestone,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Client => "client",
            NodeType::Project => "project",
            NodeType::SubProject => "sub_project",
            NodeType::Milestone => "milestone",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "client" => Ok(NodeType::Client),
            "project" => Ok(NodeType::Project),
            "sub_project" | "sub-project" | "subproject" => Ok(NodeType::SubProject),
            "milestone" => Ok(NodeType::Milestone),
            other => bail!(
                "Unknown node type: '{}'. Must be client, project, sub_project, or milestone.",
                other
            ),
        }
    }
}

/// One parsed context file: front-matter settings plus `##` sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextFile {
    /// Path-derived id of the node that owns this file.
    pub node_id: String,
    /// Front-matter keys, unknown keys included verbatim.
    #[serde(default)]
    pub settings: BTreeMap<String, Value>,
    /// Raw section bodies keyed by heading text.
    #[serde(default)]
    pub sections: BTreeMap<String, String>,
}

impl ContextFile {
    /// An empty record for a node whose file could not be read.
    pub fn empty(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            ..Self::default()
        }
    }
}

/// Root-first ordered sequence of context files for one working path.
pub type Chain = Vec<ContextFile>;

/// One merged section of an [`EffectiveContext`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveSection {
    pub content: String,
    /// Contributing node ids in chain order.
    pub sources: Vec<String>,
    #[serde(default)]
    pub is_override: bool,
}

/// The result of folding a [`Chain`] through [`merge`](crate::merge::merge).
///
/// Ordered maps keep serialization byte-identical across runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectiveContext {
    pub settings: BTreeMap<String, Value>,
    pub sections: BTreeMap<String, EffectiveSection>,
}

impl EffectiveContext {
    pub fn is_empty(&self) -> bool {
        self.settings.is_empty() && self.sections.is_empty()
    }

    pub fn section(&self, name: &str) -> Option<&EffectiveSection> {
        self.sections.get(name)
    }

    /// Render as Markdown: sections in name order under `##` headings.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        for (name, section) in &self.sections {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str("## ");
            out.push_str(name);
            out.push_str("\n\n");
            out.push_str(&section.content);
            out.push('\n');
        }
        out
    }
}

/// An indexed chunk of content, produced by the external indexer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    /// Opaque key of the chunk's vector in the index.
    pub embedding_handle: String,
    pub hierarchy_path: String,
    pub hierarchy_depth: usize,
    pub node_type: NodeType,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub phase: Option<String>,
    /// Owning client; the first path segment when absent.
    #[serde(default)]
    pub client: Option<String>,
}

impl Chunk {
    pub fn client(&self) -> Option<&str> {
        self.client
            .as_deref()
            .or_else(|| path_segments(&self.hierarchy_path).into_iter().next())
    }
}

/// Policy for milestone-typed chunks reached through the ancestor branch of
/// a scope filter.
///
/// Sub-projects and milestones can occupy the same depth, so whether a
/// milestone above the scope counts as an ancestor is a caller decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneAncestorPolicy {
    /// Milestones match as ancestors like any other node.
    Include,
    /// Milestones never match through the ancestor branch.
    Exclude,
}

impl FromStr for MilestoneAncestorPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "include" => Ok(Self::Include),
            "exclude" => Ok(Self::Exclude),
            other => bail!(
                "Unknown milestone ancestor policy: '{}'. Use include or exclude.",
                other
            ),
        }
    }
}

/// Default number of results returned by a scoped search.
pub const DEFAULT_TOP_K: usize = 20;

/// A scoped retrieval request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeQuery {
    pub client: Option<String>,
    pub scope: Option<String>,
    pub include_ancestors: bool,
    pub phase: Option<String>,
    pub tags: Option<Vec<String>>,
    pub node_types: Option<Vec<NodeType>>,
    pub proximity_boost: bool,
    pub top_k: usize,
    pub milestone_ancestors: MilestoneAncestorPolicy,
}

impl ScopeQuery {
    /// A query with the surface defaults: ancestors included, proximity
    /// boost on, `top_k = 20`, no filters.
    pub fn new(milestone_ancestors: MilestoneAncestorPolicy) -> Self {
        Self {
            client: None,
            scope: None,
            include_ancestors: true,
            phase: None,
            tags: None,
            node_types: None,
            proximity_boost: true,
            top_k: DEFAULT_TOP_K,
            milestone_ancestors,
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// The scope with surrounding separators removed, or `None` if unset or
    /// empty.
    pub fn effective_scope(&self) -> Option<&str> {
        self.scope
            .as_deref()
            .map(|s| s.trim_matches(PATH_SEPARATOR))
            .filter(|s| !s.is_empty())
    }
}

/// Split a hierarchy path into its non-empty segments.
pub fn path_segments(path: &str) -> Vec<&str> {
    path.split(PATH_SEPARATOR).filter(|s| !s.is_empty()).collect()
}

/// Number of leading segments two segment lists share.
pub fn common_prefix_len(a: &[&str], b: &[&str]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

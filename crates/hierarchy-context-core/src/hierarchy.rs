//! Node registry: the catalog of hierarchy nodes.
//!
//! Nodes discovered from a directory tree are acyclic by construction.
//! Registries rebuilt from records (e.g. a persisted JSON file) go through
//! [`NodeRegistry::from_records`], which checks ids, parent links, and
//! acyclicity before accepting them.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::models::{common_prefix_len, path_segments, NodeType};

/// One hierarchy node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Unique path-derived id (`client/project/...`).
    pub id: String,
    /// Directory holding the node's context file.
    pub path: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub parent_id: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub children: Vec<String>,
}

impl Node {
    /// Number of segments in the node id.
    pub fn depth(&self) -> usize {
        path_segments(&self.id).len()
    }
}

/// In-memory catalog of nodes keyed by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeRegistry {
    nodes: BTreeMap<String, Node>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node, linking it into its parent's `children`.
    ///
    /// Parents must be inserted before their children.
    pub fn insert(&mut self, mut node: Node) -> Result<()> {
        if self.nodes.contains_key(&node.id) {
            bail!("duplicate node id: {}", node.id);
        }
        if let Some(parent_id) = &node.parent_id {
            let Some(parent) = self.nodes.get_mut(parent_id) else {
                bail!("node {} references unknown parent {}", node.id, parent_id);
            };
            if !parent.children.contains(&node.id) {
                parent.children.push(node.id.clone());
                parent.children.sort();
            }
        }
        node.children.sort();
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Rebuild a registry from flat records, validating the structure.
    ///
    /// Rejects duplicate ids, dangling parent references, and parent cycles.
    /// `children` lists are recomputed from parent links.
    pub fn from_records(records: Vec<Node>) -> Result<Self> {
        let mut nodes: BTreeMap<String, Node> = BTreeMap::new();
        for mut node in records {
            node.children.clear();
            if nodes.contains_key(&node.id) {
                bail!("duplicate node id: {}", node.id);
            }
            nodes.insert(node.id.clone(), node);
        }

        for node in nodes.values() {
            if let Some(parent_id) = &node.parent_id {
                if !nodes.contains_key(parent_id) {
                    bail!("node {} references unknown parent {}", node.id, parent_id);
                }
            }
        }

        for start in nodes.keys() {
            let mut seen = HashSet::new();
            let mut current = Some(start.as_str());
            while let Some(id) = current {
                if !seen.insert(id) {
                    bail!("cycle in node hierarchy at {}", id);
                }
                current = nodes.get(id).and_then(|n| n.parent_id.as_deref());
            }
        }

        let links: Vec<(String, String)> = nodes
            .values()
            .filter_map(|n| n.parent_id.clone().map(|p| (p, n.id.clone())))
            .collect();
        for (parent, child) in links {
            if let Some(p) = nodes.get_mut(&parent) {
                p.children.push(child);
            }
        }
        for node in nodes.values_mut() {
            node.children.sort();
        }

        Ok(Self { nodes })
    }

    /// Flat records in id order.
    pub fn records(&self) -> Vec<Node> {
        self.nodes.values().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Nodes without a parent, in id order.
    pub fn roots(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(|n| n.parent_id.is_none())
    }

    pub fn children(&self, id: &str) -> Vec<&Node> {
        self.get(id)
            .map(|n| n.children.iter().filter_map(|c| self.get(c)).collect())
            .unwrap_or_default()
    }

    /// Ancestors of `id`, root first, excluding the node itself.
    pub fn ancestors(&self, id: &str) -> Vec<&Node> {
        let mut out = Vec::new();
        let mut current = self.get(id).and_then(|n| n.parent_id.as_deref());
        while let Some(pid) = current {
            let Some(parent) = self.get(pid) else { break };
            out.push(parent);
            current = parent.parent_id.as_deref();
        }
        out.reverse();
        out
    }

    /// Deepest node whose id is an ancestor-or-self of `hierarchy_path`.
    pub fn nearest(&self, hierarchy_path: &str) -> Option<&Node> {
        let target = path_segments(hierarchy_path);
        self.nodes
            .values()
            .filter(|n| {
                let segs = path_segments(&n.id);
                !segs.is_empty() && common_prefix_len(&segs, &target) == segs.len()
            })
            .max_by_key(|n| n.depth())
    }
}

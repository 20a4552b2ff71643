//! Node discovery and registry persistence.
//!
//! Walks `clients_root` and registers every directory that holds a context
//! file. Hidden directories and the `_global` directory are skipped, as are
//! context files matching `registry.exclude_globs` (matched against the
//! file's path relative to `clients_root`).

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde_json::Value;
use walkdir::{DirEntry, WalkDir};

use hierarchy_context_core::hierarchy::{Node, NodeRegistry};
use hierarchy_context_core::merge::additive_items;
use hierarchy_context_core::models::{NodeType, PATH_SEPARATOR};

use crate::cache::write_atomic;
use crate::chain::{node_id_for_dir, normalize, ResolverOptions, GLOBAL_DIR};
use crate::config::Config;
use crate::frontmatter::split_document;

/// Discover nodes under `clients_root`.
pub fn discover(opts: &ResolverOptions, exclude_globs: &[String]) -> Result<NodeRegistry> {
    let root = normalize(&opts.clients_root);
    if !root.is_dir() {
        bail!("clients_root does not exist: {}", root.display());
    }
    let excludes = build_globset(exclude_globs)?;

    let mut found = Vec::new();
    let walker = WalkDir::new(&root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped_dir(e));
    for entry in walker {
        let entry = entry?;
        // The root's own context file is a chain level, not a node.
        if entry.depth() < 2
            || !entry.file_type().is_file()
            || entry.file_name() != opts.context_file_name.as_str()
        {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(&root).unwrap_or(path);
        if excludes.is_match(relative) {
            tracing::debug!(file = %relative.display(), "excluded from registry");
            continue;
        }
        let Some(dir) = path.parent() else { continue };
        found.push((node_id_for_dir(&root, dir), dir.to_path_buf(), path.to_path_buf()));
    }
    found.sort_by(|a, b| a.0.cmp(&b.0));

    let mut registry = NodeRegistry::new();
    for (id, dir, file) in found {
        let (node_type, tags) = read_node_meta(&id, &file);
        let parent_id = nearest_registered_ancestor(&registry, &id);
        registry.insert(Node {
            id,
            path: dir.display().to_string(),
            node_type,
            parent_id,
            tags,
            children: Vec::new(),
        })?;
    }

    tracing::info!(nodes = registry.len(), root = %root.display(), "discovered hierarchy nodes");
    Ok(registry)
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() || entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || (entry.depth() == 1 && name == GLOBAL_DIR)
}

fn nearest_registered_ancestor(registry: &NodeRegistry, id: &str) -> Option<String> {
    let mut current = id;
    while let Some(idx) = current.rfind(PATH_SEPARATOR) {
        current = &current[..idx];
        if registry.get(current).is_some() {
            return Some(current.to_string());
        }
    }
    None
}

/// Node type and tags from a context file's front-matter.
///
/// Falls back to the depth default when `type` is missing or not a known
/// variant.
fn read_node_meta(id: &str, file: &Path) -> (NodeType, BTreeSet<String>) {
    let depth = id.split(PATH_SEPARATOR).filter(|s| !s.is_empty()).count();
    let default_type = NodeType::for_depth(depth);

    let settings = match std::fs::read_to_string(file) {
        Ok(text) => match split_document(&text).front_matter {
            Some(Ok(settings)) => settings,
            _ => return (default_type, BTreeSet::new()),
        },
        Err(e) => {
            tracing::warn!(file = %file.display(), error = %e, "failed to read context file");
            return (default_type, BTreeSet::new());
        }
    };

    let node_type = settings
        .get("type")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<NodeType>().ok())
        .unwrap_or(default_type);

    (node_type, settings.get("tags").map(tag_set).unwrap_or_default())
}

fn tag_set(value: &Value) -> BTreeSet<String> {
    let items: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::String(_) => vec![value],
        other => additive_items(other)
            .map(|items| items.iter().collect())
            .unwrap_or_default(),
    };
    items
        .into_iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}

/// Write the registry as a JSON array of node records.
pub fn save(registry: &NodeRegistry, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let bytes = serde_json::to_vec_pretty(&registry.records())?;
    write_atomic(path, &bytes)?;
    tracing::info!(nodes = registry.len(), file = %path.display(), "saved node registry");
    Ok(())
}

/// Load and validate a registry saved by [`save`].
pub fn load(path: &Path) -> Result<NodeRegistry> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read node registry: {}", path.display()))?;
    let records: Vec<Node> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse node registry: {}", path.display()))?;
    NodeRegistry::from_records(records)
        .with_context(|| format!("Invalid node registry: {}", path.display()))
}

/// `hctx nodes [--save]`: print the discovered tree, optionally saving it.
pub fn run_nodes(config: &Config, save_registry: bool) -> Result<()> {
    let registry = discover(
        &config.hierarchy.resolver_options(),
        &config.registry.exclude_globs,
    )?;

    if registry.is_empty() {
        println!("No nodes.");
    }
    for root in registry.roots() {
        print_tree(&registry, root, 0);
    }

    if save_registry {
        let Some(path) = &config.registry.path else {
            bail!("registry.path is not configured");
        };
        save(&registry, path)?;
        println!();
        println!("Saved {} node(s) to {}", registry.len(), path.display());
    }
    Ok(())
}

fn print_tree(registry: &NodeRegistry, node: &Node, indent: usize) {
    let tags = if node.tags.is_empty() {
        String::new()
    } else {
        let tags: Vec<&str> = node.tags.iter().map(String::as_str).collect();
        format!("  [{}]", tags.join(", "))
    };
    println!("{}{} ({}){}", "  ".repeat(indent), node.id, node.node_type, tags);
    for child in registry.children(&node.id) {
        print_tree(registry, child, indent + 1);
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

//! Chain resolver: collects the context files that apply to a working path.
//!
//! Starting at the leaf directory, the resolver walks upward and records
//! every level that holds a context file. The walk stops before the parent
//! of `clients_root` (or at the filesystem root for paths outside it). The
//! global context file, when present, is always placed first.
//!
//! ```text
//! clients/_global/CONTEXT.md       → global        (position 0)
//! clients/CONTEXT.md               → root
//! clients/rescue/CONTEXT.md        → rescue
//! clients/rescue/erp/              (no file, skipped)
//! clients/rescue/erp/sap/CONTEXT.md → rescue/erp/sap
//! ```
//!
//! Node ids come from paths only, so a chain's ids and file list can be
//! computed without reading any file content.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use hierarchy_context_core::models::{Chain, GLOBAL_NODE_ID};

use crate::frontmatter::load_context_file;

/// Node id of a context file placed directly in `clients_root`.
pub const ROOT_NODE_ID: &str = "root";

/// Directory under `clients_root` holding the default global context file.
pub const GLOBAL_DIR: &str = "_global";

/// Where and how to look for context files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverOptions {
    pub clients_root: PathBuf,
    pub context_file_name: String,
    /// Explicit global context file; defaults to
    /// `<clients_root>/_global/<context_file_name>`.
    pub global_context: Option<PathBuf>,
}

impl ResolverOptions {
    pub fn new(clients_root: impl Into<PathBuf>) -> Self {
        Self {
            clients_root: clients_root.into(),
            context_file_name: "CONTEXT.md".to_string(),
            global_context: None,
        }
    }

    pub fn global_path(&self) -> PathBuf {
        match &self.global_context {
            Some(p) => p.clone(),
            None => self
                .clients_root
                .join(GLOBAL_DIR)
                .join(&self.context_file_name),
        }
    }
}

/// One level of a chain, before its content is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainFile {
    pub node_id: String,
    pub path: PathBuf,
}

/// Absolute, symlink-free form of `path`, so symlinked and relative paths
/// compare equal.
///
/// The path need not exist: the deepest existing ancestor is canonicalized
/// and the missing tail re-appended.
pub fn normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    let mut tail: Vec<OsString> = Vec::new();
    let mut existing = absolute.as_path();
    loop {
        if let Ok(mut canonical) = std::fs::canonicalize(existing) {
            canonical.extend(tail.iter().rev());
            return canonical;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = parent;
            }
            _ => return absolute,
        }
    }
}

/// Path-derived node id of a directory.
///
/// `/`-joined path relative to `clients_root`; [`ROOT_NODE_ID`] for the root
/// itself; the full directory path for levels outside the root.
pub fn node_id_for_dir(clients_root: &Path, dir: &Path) -> String {
    match dir.strip_prefix(clients_root) {
        Ok(rel) => {
            let parts: Vec<String> = rel
                .components()
                .filter_map(|c| match c {
                    Component::Normal(s) => Some(s.to_string_lossy().to_string()),
                    _ => None,
                })
                .collect();
            if parts.is_empty() {
                ROOT_NODE_ID.to_string()
            } else {
                parts.join("/")
            }
        }
        Err(_) => dir.display().to_string(),
    }
}

/// List the chain's files root-first without reading them.
pub fn chain_files(leaf_path: &Path, opts: &ResolverOptions) -> Vec<ChainFile> {
    let root = normalize(&opts.clients_root);
    let leaf = normalize(leaf_path);
    let start = if leaf.is_file() {
        leaf.parent().map(Path::to_path_buf).unwrap_or(leaf)
    } else {
        leaf
    };

    let global = normalize(&opts.global_path());
    let stop = root.parent();

    let mut levels = Vec::new();
    for dir in start.ancestors() {
        if stop == Some(dir) {
            break;
        }
        let candidate = dir.join(&opts.context_file_name);
        if candidate.is_file() && normalize(&candidate) != global {
            levels.push(ChainFile {
                node_id: node_id_for_dir(&root, dir),
                path: candidate,
            });
        }
    }
    levels.reverse();

    if global.is_file() {
        levels.insert(
            0,
            ChainFile {
                node_id: GLOBAL_NODE_ID.to_string(),
                path: global,
            },
        );
    }

    levels
}

/// Resolve the full chain for a working path, reading every context file.
///
/// Unreadable files contribute an empty record; the walk never aborts.
pub fn resolve_chain(leaf_path: &Path, opts: &ResolverOptions) -> Chain {
    load_chain(&chain_files(leaf_path, opts))
}

/// Read the given chain levels in order.
pub fn load_chain(files: &[ChainFile]) -> Chain {
    files
        .iter()
        .map(|f| load_context_file(&f.path, &f.node_id))
        .collect()
}

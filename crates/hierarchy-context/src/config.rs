//! TOML configuration parsing and validation.
//!
//! ```toml
//! [hierarchy]
//! clients_root = "/work/clients"
//! context_file_name = "CONTEXT.md"          # default
//! # global_context = "/work/clients/_global/CONTEXT.md"
//!
//! [cache]
//! dir = "/work/.hctx/cache"
//!
//! [registry]
//! path = "/work/.hctx/nodes.json"
//! exclude_globs = ["**/archive/**"]
//!
//! [retrieval]
//! top_k = 20
//! include_ancestors = true
//! proximity_boost = true
//! milestone_ancestors = "include"            # required: include | exclude
//! chunk_index = "/work/.hctx/chunks.jsonl"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use hierarchy_context_core::models::{MilestoneAncestorPolicy, ScopeQuery, DEFAULT_TOP_K};

use crate::chain::ResolverOptions;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub hierarchy: HierarchyConfig,
    pub cache: CacheConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HierarchyConfig {
    pub clients_root: PathBuf,
    #[serde(default = "default_context_file_name")]
    pub context_file_name: String,
    #[serde(default)]
    pub global_context: Option<PathBuf>,
}

fn default_context_file_name() -> String {
    "CONTEXT.md".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RegistryConfig {
    /// Where `hctx nodes --save` writes the registry.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_true")]
    pub include_ancestors: bool,
    #[serde(default = "default_true")]
    pub proximity_boost: bool,
    /// Deliberately has no default.
    pub milestone_ancestors: MilestoneAncestorPolicy,
    #[serde(default)]
    pub chunk_index: Option<PathBuf>,
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}
fn default_true() -> bool {
    true
}

impl HierarchyConfig {
    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            clients_root: self.clients_root.clone(),
            context_file_name: self.context_file_name.clone(),
            global_context: self.global_context.clone(),
        }
    }
}

impl RetrievalConfig {
    /// A query pre-filled with the configured defaults.
    pub fn base_query(&self) -> ScopeQuery {
        let mut query = ScopeQuery::new(self.milestone_ancestors).with_top_k(self.top_k);
        query.include_ancestors = self.include_ancestors;
        query.proximity_boost = self.proximity_boost;
        query
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.hierarchy.context_file_name.trim().is_empty() {
        bail!("hierarchy.context_file_name must not be empty");
    }
    if config.hierarchy.context_file_name.contains(['/', '\\']) {
        bail!(
            "hierarchy.context_file_name must be a bare file name, got '{}'",
            config.hierarchy.context_file_name
        );
    }

    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }

    Ok(config)
}

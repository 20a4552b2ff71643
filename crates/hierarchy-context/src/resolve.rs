//! CLI entry points for context resolution.
//!
//! # Usage
//!
//! ```bash
//! hctx resolve ~/clients/rescue/erp/sap               # JSON (default)
//! hctx resolve ~/clients/rescue/erp/sap --format markdown
//! hctx chain ~/clients/rescue/erp/sap
//! hctx cache clear
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use hierarchy_context_core::models::EffectiveSection;

use crate::cache::{chain_fingerprint, CacheManager, ResolveOutcome};
use crate::chain::chain_files;
use crate::config::Config;

/// JSON shape printed by `hctx resolve`.
#[derive(Debug, Serialize)]
pub struct ResolveReport {
    pub node_id: Option<String>,
    pub cache_key: String,
    pub cache_hit: bool,
    pub generated_at: DateTime<Utc>,
    pub chain: Vec<String>,
    pub settings: BTreeMap<String, Value>,
    pub sections: BTreeMap<String, EffectiveSection>,
}

impl From<&ResolveOutcome> for ResolveReport {
    fn from(outcome: &ResolveOutcome) -> Self {
        Self {
            node_id: outcome.node_id.clone(),
            cache_key: outcome.cache_key.clone(),
            cache_hit: outcome.hit,
            generated_at: outcome.entry.generated_at,
            chain: outcome
                .chain
                .iter()
                .map(|f| f.path.display().to_string())
                .collect(),
            settings: outcome.effective().settings.clone(),
            sections: outcome.effective().sections.clone(),
        }
    }
}

pub fn cache_manager(config: &Config) -> CacheManager {
    CacheManager::new(config.hierarchy.resolver_options(), &config.cache.dir)
}

/// `hctx resolve <path>`.
pub fn run_resolve(config: &Config, path: &Path, format: &str) -> Result<()> {
    if !matches!(format, "json" | "markdown") {
        bail!("Unknown format: '{}'. Use json or markdown.", format);
    }
    let outcome = cache_manager(config).resolve(path);

    if outcome.node_id.is_none() {
        tracing::warn!(path = %path.display(), "no context files apply to this path");
    }

    match format {
        "markdown" => print!("{}", outcome.effective().to_markdown()),
        _ => println!(
            "{}",
            serde_json::to_string_pretty(&ResolveReport::from(&outcome))?
        ),
    }
    Ok(())
}

/// `hctx chain <path>`: list the chain's levels root-first with stamps.
pub fn run_chain(config: &Config, path: &Path) -> Result<()> {
    let files = chain_files(path, &config.hierarchy.resolver_options());
    if files.is_empty() {
        println!("No context files.");
        return Ok(());
    }

    let stamps = chain_fingerprint(&files);
    for (i, (file, stamp)) in files.iter().zip(&stamps).enumerate() {
        println!("{}. {}", i, file.node_id);
        println!("    file: {}", stamp.path);
        println!("    size: {}  mtime: {}", stamp.size, stamp.mtime);
    }
    println!();
    println!("cache_key: {}", hierarchy_context_core::fingerprint::cache_key(&stamps));
    Ok(())
}

/// `hctx cache clear`.
pub fn run_cache_clear(config: &Config) -> Result<()> {
    let removed = cache_manager(config).clear()?;
    println!(
        "Removed {} cache record(s) from {}",
        removed,
        config.cache.dir.display()
    );
    Ok(())
}

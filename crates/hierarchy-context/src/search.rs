//! Scoped search from the command line.
//!
//! Loads the chunk export named by `retrieval.chunk_index`, reads a
//! pre-computed query vector, and runs the core orchestrator with a
//! [`ScopeQuery`] built from config defaults plus CLI flags.
//!
//! # Usage
//!
//! ```bash
//! hctx search --vector-file q.json --scope rescue/erp
//! hctx search --vector-file q.json --from ~/clients/rescue/erp/sap --tag sap
//! hctx search --vector-file q.json --no-boost --top-k 5
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use hierarchy_context_core::index::VectorIndex;
use hierarchy_context_core::models::{NodeType, ScopeQuery, GLOBAL_NODE_ID};
use hierarchy_context_core::search::{search, SearchResponse};

use crate::chain::{chain_files, normalize, ResolverOptions, ROOT_NODE_ID};
use crate::chunks::{load_chunks, load_vector};
use crate::config::Config;

/// CLI flags for `hctx search`.
#[derive(Debug, Clone, Default)]
pub struct SearchArgs {
    pub vector_file: PathBuf,
    pub scope: Option<String>,
    /// Working directory to derive the scope from.
    pub from: Option<PathBuf>,
    pub client: Option<String>,
    pub phase: Option<String>,
    pub tags: Vec<String>,
    pub node_types: Vec<String>,
    pub no_ancestors: bool,
    pub no_boost: bool,
    pub top_k: Option<usize>,
}

/// Scope for a working directory: the id of the deepest node with a context
/// file at or above it.
pub fn scope_for_dir(opts: &ResolverOptions, dir: &Path) -> Result<Option<String>> {
    let root = normalize(&opts.clients_root);
    if !normalize(dir).starts_with(&root) {
        bail!(
            "{} is not inside clients_root {}",
            dir.display(),
            root.display()
        );
    }
    Ok(chain_files(dir, opts)
        .into_iter()
        .rev()
        .map(|f| f.node_id)
        .find(|id| id != GLOBAL_NODE_ID && id != ROOT_NODE_ID))
}

/// Combine config defaults with CLI flags.
pub fn build_query(config: &Config, args: &SearchArgs) -> Result<ScopeQuery> {
    let mut query = config.retrieval.base_query();

    query.scope = match (&args.scope, &args.from) {
        (Some(_), Some(_)) => bail!("--scope and --from are mutually exclusive"),
        (Some(scope), None) => Some(scope.clone()),
        (None, Some(dir)) => scope_for_dir(&config.hierarchy.resolver_options(), dir)?,
        (None, None) => None,
    };
    query.client = args.client.clone();
    query.phase = args.phase.clone();
    if !args.tags.is_empty() {
        query.tags = Some(args.tags.clone());
    }
    if !args.node_types.is_empty() {
        let types = args
            .node_types
            .iter()
            .map(|t| t.parse::<NodeType>())
            .collect::<Result<Vec<_>>>()?;
        query.node_types = Some(types);
    }
    if args.no_ancestors {
        query.include_ancestors = false;
    }
    if args.no_boost {
        query.proximity_boost = false;
    }
    if let Some(k) = args.top_k {
        query.top_k = k;
    }
    Ok(query)
}

/// Run a search against any index.
pub async fn search_index<I: VectorIndex + ?Sized>(
    index: &I,
    query_vec: &[f32],
    query: &ScopeQuery,
) -> Result<SearchResponse> {
    Ok(search(index, query_vec, query).await?)
}

/// `hctx search`.
pub async fn run_search(config: &Config, args: &SearchArgs) -> Result<()> {
    let Some(chunk_index) = &config.retrieval.chunk_index else {
        bail!("retrieval.chunk_index is not configured");
    };
    let index = load_chunks(chunk_index)?;
    let query_vec = load_vector(&args.vector_file)?;
    let query = build_query(config, args)?;

    let response = search_index(&index, &query_vec, &query)
        .await
        .context("Search failed")?;

    println!(
        "Search: scope={}, ancestors={}, boost={}, candidates={}",
        response.scope_used.as_deref().unwrap_or("(none)"),
        response.ancestors_included,
        response.proximity_boost_applied,
        response.candidates_considered
    );
    println!();

    if response.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in response.results.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} ({})",
            i + 1,
            hit.score,
            hit.chunk.hierarchy_path,
            hit.chunk.node_type
        );
        println!(
            "    similarity={:.3}  proximity={:.3}  boost={:.3}",
            hit.similarity, hit.proximity, hit.boost_factor
        );
        println!("    handle: {}", hit.chunk.embedding_handle);
        println!(
            "    excerpt: \"{}\"",
            hit.chunk.content.replace('\n', " ").trim()
        );
        println!();
    }

    Ok(())
}

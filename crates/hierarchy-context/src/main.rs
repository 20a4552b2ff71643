//! # Hierarchy Context CLI (`hctx`)
//!
//! ## Usage
//!
//! ```bash
//! hctx --config ./config/hctx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `hctx resolve <path>` | Print the merged context for a working path |
//! | `hctx chain <path>` | List the context files that apply to a path |
//! | `hctx nodes` | Discover and print the node tree |
//! | `hctx search --vector-file <json>` | Scoped, proximity-ranked search |
//! | `hctx cache clear` | Remove every cached context |
//!
//! Logs go to stderr. `RUST_LOG` overrides the default filter.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use hierarchy_context::config;
use hierarchy_context::registry;
use hierarchy_context::resolve;
use hierarchy_context::search::{self, SearchArgs};

/// Hierarchy Context CLI: merged context files and scoped retrieval for
/// nested client work.
#[derive(Parser)]
#[command(
    name = "hctx",
    about = "Resolve nested client/project context files and run scoped retrieval",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/hctx.toml")]
    config: PathBuf,

    /// Log at debug level (ignored when RUST_LOG is set).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective context for a working path.
    ///
    /// Served from the cache when no file in the chain has changed.
    Resolve {
        /// Directory (or file) to resolve from.
        path: PathBuf,

        /// Output format: `json` or `markdown`.
        #[arg(long, default_value = "json")]
        format: String,
    },

    /// List the chain of context files for a working path, root first.
    Chain {
        path: PathBuf,
    },

    /// Discover hierarchy nodes under `clients_root`.
    Nodes {
        /// Write the registry to `registry.path`.
        #[arg(long)]
        save: bool,
    },

    /// Scoped similarity search over the chunk export.
    Search {
        /// JSON array holding the query embedding.
        #[arg(long)]
        vector_file: PathBuf,

        /// Hierarchy path to scope to (e.g. `rescue/erp`).
        #[arg(long, conflicts_with = "from")]
        scope: Option<String>,

        /// Derive the scope from a working directory.
        #[arg(long)]
        from: Option<PathBuf>,

        #[arg(long)]
        client: Option<String>,

        #[arg(long)]
        phase: Option<String>,

        /// Require this tag (repeatable; any match passes).
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Restrict to node types (repeatable).
        #[arg(long = "node-type")]
        node_types: Vec<String>,

        /// Only match the scope's descendants.
        #[arg(long)]
        no_ancestors: bool,

        /// Rank by raw similarity only.
        #[arg(long)]
        no_boost: bool,

        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Manage the context cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Remove all cached contexts.
    Clear,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "hierarchy_context=debug,hierarchy_context_core=debug"
    } else {
        "hierarchy_context=info,hierarchy_context_core=info"
    };
    let filter =
        tracing_subscriber::EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| default.into()));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Resolve { path, format } => resolve::run_resolve(&cfg, &path, &format)?,
        Commands::Chain { path } => resolve::run_chain(&cfg, &path)?,
        Commands::Nodes { save } => registry::run_nodes(&cfg, save)?,
        Commands::Search {
            vector_file,
            scope,
            from,
            client,
            phase,
            tags,
            node_types,
            no_ancestors,
            no_boost,
            top_k,
        } => {
            let args = SearchArgs {
                vector_file,
                scope,
                from,
                client,
                phase,
                tags,
                node_types,
                no_ancestors,
                no_boost,
                top_k,
            };
            search::run_search(&cfg, &args).await?;
        }
        Commands::Cache {
            action: CacheAction::Clear,
        } => resolve::run_cache_clear(&cfg)?,
    }

    Ok(())
}

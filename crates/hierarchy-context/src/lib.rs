//! # Hierarchy Context
//!
//! **Nested client/project context files, resolved into one merged context.**
//!
//! Work is organized as a directory tree (client → project → sub-project →
//! milestone). Each level may carry a `CONTEXT.md` with YAML front-matter
//! and `##` sections. Working at any depth, the tool walks up the tree,
//! merges every level it finds (closer levels win), caches the result by
//! file fingerprint, and scopes vector retrieval to the current branch with
//! a proximity boost.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ CONTEXT.md  │──▶│ Chain + Merge │──▶│ Cache (JSON)  │
//! │  per level  │   │  (core fold)  │   │ by fingerprint│
//! └─────────────┘   └──────────────┘   └──────────────┘
//!
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ chunks.jsonl│──▶│ Scope filter  │──▶│ Proximity     │
//! │ + vectors   │   │ + similarity  │   │ re-rank       │
//! └─────────────┘   └──────────────┘   └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`frontmatter`] | Context file parsing: YAML front-matter and `##` sections |
//! | [`chain`] | Chain resolver: context files from root to leaf |
//! | [`cache`] | Fingerprint-validated cache of effective contexts |
//! | [`registry`] | Node discovery, registry save/load |
//! | [`chunks`] | JSONL chunk export loader |
//! | [`resolve`] | `hctx resolve`, `hctx chain`, `hctx cache clear` |
//! | [`search`] | `hctx search`: scoped, proximity-ranked retrieval |
//!
//! Merging, fingerprints, filtering, scoring, and the retrieval orchestrator
//! live in the [`hierarchy_context_core`] crate.

pub mod cache;
pub mod chain;
pub mod chunks;
pub mod config;
pub mod frontmatter;
pub mod registry;
pub mod resolve;
pub mod search;

pub use cache::{CacheManager, ResolveOutcome};
pub use chain::{resolve_chain, ResolverOptions};

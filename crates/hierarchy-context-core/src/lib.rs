//! # Hierarchy Context Core
//!
//! Pure logic for Hierarchy Context: data models, the chain merge, cache
//! fingerprints, the scoped chunk filter, proximity ranking, and the
//! retrieval orchestrator with its vector-index trait.
//!
//! This crate does no filesystem I/O and pulls in no runtime. Reading
//! context files, walking directories, and persisting caches live in the
//! `hierarchy-context` app crate.

pub mod embedding;
pub mod filter;
pub mod fingerprint;
pub mod hierarchy;
pub mod index;
pub mod merge;
pub mod models;
pub mod proximity;
pub mod search;

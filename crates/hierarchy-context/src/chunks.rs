//! Chunk export loader.
//!
//! Reads the JSONL file written by the external indexer into an
//! [`InMemoryIndex`]. Each non-blank line is one chunk record plus its
//! vector:
//!
//! ```json
//! {"content": "...", "embedding_handle": "c1", "hierarchy_path": "rescue/erp",
//!  "hierarchy_depth": 2, "node_type": "project", "tags": ["erp"],
//!  "phase": "discovery", "embedding": [0.1, 0.2, 0.3]}
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use hierarchy_context_core::index::memory::InMemoryIndex;
use hierarchy_context_core::models::Chunk;

#[derive(Debug, Deserialize)]
struct ChunkRecord {
    #[serde(flatten)]
    chunk: Chunk,
    embedding: Vec<f32>,
}

/// Parse JSONL chunk records into a fresh index.
pub fn parse_chunks(text: &str) -> Result<InMemoryIndex> {
    let index = InMemoryIndex::new();
    for (i, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let line_no = i + 1;
        let record: ChunkRecord = serde_json::from_str(line)
            .with_context(|| format!("line {}: invalid chunk record", line_no))?;
        index
            .upsert(record.chunk, record.embedding)
            .with_context(|| format!("line {}", line_no))?;
    }
    Ok(index)
}

/// Load a chunk export file.
pub fn load_chunks(path: &Path) -> Result<InMemoryIndex> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read chunk index: {}", path.display()))?;
    let index = parse_chunks(&text).with_context(|| format!("In {}", path.display()))?;
    tracing::debug!(chunks = index.len(), file = %path.display(), "loaded chunk index");
    Ok(index)
}

/// Read a query vector: a JSON array of numbers.
pub fn load_vector(path: &Path) -> Result<Vec<f32>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read query vector: {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Query vector must be a JSON array of numbers: {}", path.display()))
}

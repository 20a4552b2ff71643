//! Cache manager: memoizes effective contexts by chain fingerprint.
//!
//! Entries are keyed by the chain's leaf node id and validated on every
//! read against the current `(path, mtime, size)` stamps of the chain's
//! files. There is no watcher and no TTL: a changed, added, or removed file
//! anywhere in a chain changes its cache key, and only that leaf's entry is
//! recomputed.
//!
//! # Storage
//!
//! - In-process: `RwLock<HashMap<node_id, Arc<CacheEntry>>>`, swapped on
//!   write.
//! - On disk (optional): one JSON record per node id under the cache
//!   directory, written to a unique temp file and renamed into place so a
//!   reader never sees a partial record. Unreadable or corrupted records are
//!   treated as misses and overwritten.
//!
//! Concurrent resolutions of the same leaf may both recompute; the last
//! rename wins and both results are identical.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use hierarchy_context_core::fingerprint::{cache_key, FileStamp};
use hierarchy_context_core::merge::merge;
use hierarchy_context_core::models::{EffectiveContext, EffectiveSection};

use crate::chain::{chain_files, load_chain, ChainFile, ResolverOptions};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A memoized effective context.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub cache_key: String,
    pub generated_at: DateTime<Utc>,
    pub chain_fingerprint: Vec<FileStamp>,
    pub effective: EffectiveContext,
}

/// On-disk shape of a [`CacheEntry`].
#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    node_id: String,
    cache_key: String,
    generated_at: DateTime<Utc>,
    chain: Vec<FileStamp>,
    effective_settings: BTreeMap<String, Value>,
    effective_sections: BTreeMap<String, EffectiveSection>,
}

impl CacheRecord {
    fn new(node_id: &str, entry: &CacheEntry) -> Self {
        Self {
            node_id: node_id.to_string(),
            cache_key: entry.cache_key.clone(),
            generated_at: entry.generated_at,
            chain: entry.chain_fingerprint.clone(),
            effective_settings: entry.effective.settings.clone(),
            effective_sections: entry.effective.sections.clone(),
        }
    }

    fn into_entry(self) -> CacheEntry {
        CacheEntry {
            cache_key: self.cache_key,
            generated_at: self.generated_at,
            chain_fingerprint: self.chain,
            effective: EffectiveContext {
                settings: self.effective_settings,
                sections: self.effective_sections,
            },
        }
    }
}

/// Result of [`CacheManager::resolve`].
#[derive(Debug, Clone)]
pub struct ResolveOutcome {
    /// Leaf node id; `None` when no context file applies.
    pub node_id: Option<String>,
    pub cache_key: String,
    pub hit: bool,
    pub entry: Arc<CacheEntry>,
    pub chain: Vec<ChainFile>,
}

impl ResolveOutcome {
    pub fn effective(&self) -> &EffectiveContext {
        &self.entry.effective
    }
}

/// Stamp one file. Missing or unreadable files stamp as `(0, 0)`, which
/// still differs from any real stamp and is revalidated next time.
pub fn stamp(path: &Path) -> FileStamp {
    let (mtime, size) = match std::fs::metadata(path) {
        Ok(meta) => {
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
                .unwrap_or(0);
            (mtime, meta.len())
        }
        Err(e) => {
            tracing::warn!(file = %path.display(), error = %e, "cannot stat context file");
            (0, 0)
        }
    };
    FileStamp::new(path.display().to_string(), mtime, size)
}

/// Fingerprint a chain from file metadata only.
pub fn chain_fingerprint(files: &[ChainFile]) -> Vec<FileStamp> {
    files.iter().map(|f| stamp(&f.path)).collect()
}

/// Process-wide store of effective contexts keyed by leaf node id.
pub struct CacheManager {
    options: ResolverOptions,
    dir: Option<PathBuf>,
    entries: RwLock<HashMap<String, Arc<CacheEntry>>>,
}

impl CacheManager {
    /// A cache persisted under `dir`.
    pub fn new(options: ResolverOptions, dir: impl Into<PathBuf>) -> Self {
        Self {
            options,
            dir: Some(dir.into()),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// A cache that lives only as long as the process.
    pub fn in_memory(options: ResolverOptions) -> Self {
        Self {
            options,
            dir: None,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// Effective context for a working path, recomputed only when stale.
    pub fn get_or_resolve(&self, leaf_path: &Path) -> EffectiveContext {
        self.resolve(leaf_path).entry.effective.clone()
    }

    /// Like [`get_or_resolve`](Self::get_or_resolve), with cache details.
    pub fn resolve(&self, leaf_path: &Path) -> ResolveOutcome {
        let files = chain_files(leaf_path, &self.options);
        let fingerprint = chain_fingerprint(&files);
        let key = cache_key(&fingerprint);

        let Some(node_id) = files.last().map(|f| f.node_id.clone()) else {
            return ResolveOutcome {
                node_id: None,
                cache_key: key.clone(),
                hit: false,
                entry: Arc::new(CacheEntry {
                    cache_key: key,
                    generated_at: Utc::now(),
                    chain_fingerprint: fingerprint,
                    effective: EffectiveContext::default(),
                }),
                chain: files,
            };
        };

        if let Some(entry) = self.lookup(&node_id, &key) {
            tracing::debug!(node = %node_id, key = %key, "context cache hit");
            return ResolveOutcome {
                node_id: Some(node_id),
                cache_key: key,
                hit: true,
                entry,
                chain: files,
            };
        }

        tracing::debug!(node = %node_id, key = %key, "context cache miss, resolving chain");
        let entry = CacheEntry {
            cache_key: key.clone(),
            generated_at: Utc::now(),
            chain_fingerprint: fingerprint,
            effective: merge(&load_chain(&files)),
        };
        let entry = self.store(&node_id, entry);

        ResolveOutcome {
            node_id: Some(node_id),
            cache_key: key,
            hit: false,
            entry,
            chain: files,
        }
    }

    /// Return the stored entry for `node_id` if its key matches `key`.
    ///
    /// Checks the in-process map first, then the persisted record.
    pub fn lookup(&self, node_id: &str, key: &str) -> Option<Arc<CacheEntry>> {
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = entries.get(node_id) {
                if entry.cache_key == key {
                    return Some(entry.clone());
                }
            }
        }

        let entry = self.read_record(node_id)?;
        if entry.cache_key != key {
            return None;
        }
        let entry = Arc::new(entry);
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(node_id.to_string(), entry.clone());
        Some(entry)
    }

    /// Store an entry, replacing any previous one for `node_id`.
    ///
    /// Persistence failures are logged; the in-process entry is kept.
    pub fn store(&self, node_id: &str, entry: CacheEntry) -> Arc<CacheEntry> {
        if let Err(e) = self.write_record(node_id, &entry) {
            tracing::warn!(node = node_id, error = %format!("{:#}", e), "failed to persist context cache");
        }
        let entry = Arc::new(entry);
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(node_id.to_string(), entry.clone());
        entry
    }

    /// Drop one node's entry from memory and disk.
    pub fn invalidate(&self, node_id: &str) -> Result<()> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(node_id);
        if let Some(path) = self.record_path(node_id) {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to remove {}", path.display()))
                }
            }
        }
        Ok(())
    }

    /// Drop every entry. Returns the number of persisted records removed.
    pub fn clear(&self) -> Result<usize> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        let Some(dir) = &self.dir else { return Ok(0) };
        if !dir.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read cache dir: {}", dir.display()))?
        {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "json") {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Persisted record location for a node id.
    pub fn record_path(&self, node_id: &str) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.join(record_file_name(node_id)))
    }

    fn read_record(&self, node_id: &str) -> Option<CacheEntry> {
        let path = self.record_path(node_id)?;
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "unreadable cache record, treating as miss");
                return None;
            }
        };
        match serde_json::from_slice::<CacheRecord>(&bytes) {
            Ok(record) if record.node_id == node_id => Some(record.into_entry()),
            Ok(record) => {
                tracing::warn!(
                    file = %path.display(),
                    expected = node_id,
                    found = %record.node_id,
                    "cache record belongs to another node, treating as miss"
                );
                None
            }
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "corrupted cache record, treating as miss");
                None
            }
        }
    }

    fn write_record(&self, node_id: &str, entry: &CacheEntry) -> Result<()> {
        let Some(path) = self.record_path(node_id) else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create cache dir: {}", parent.display()))?;
        }
        let bytes = serde_json::to_vec_pretty(&CacheRecord::new(node_id, entry))?;
        write_atomic(&path, &bytes)?;
        tracing::info!(node = node_id, file = %path.display(), "persisted context cache record");
        Ok(())
    }
}

/// Write `bytes` to a unique temp file next to `path`, then rename it over
/// `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(
        ".{}.{}.{}.tmp",
        file_name,
        std::process::id(),
        TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    std::fs::write(&tmp, bytes).with_context(|| format!("Failed to write {}", tmp.display()))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("Failed to rename into {}", path.display()));
    }
    Ok(())
}

/// Filesystem-safe, collision-free record name for a node id.
fn record_file_name(node_id: &str) -> String {
    let readable: String = node_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    let mut hasher = Sha256::new();
    hasher.update(node_id.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{}-{}.json", readable.trim_matches('_'), &digest[..8])
}

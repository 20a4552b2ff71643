//! Chain fingerprints and cache keys.
//!
//! A fingerprint is the ordered list of `(path, mtime, size)` stamps of the
//! files in a chain. It is computed from file metadata only, so staleness
//! can be detected without reading file contents. The cache key is a
//! truncated SHA-256 over a deterministic rendering of the fingerprint.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of hex characters kept from the SHA-256 digest.
pub const CACHE_KEY_LEN: usize = 16;

/// Metadata stamp of one file in a chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileStamp {
    pub path: String,
    /// Modification time in nanoseconds since the Unix epoch.
    pub mtime: u64,
    pub size: u64,
}

impl FileStamp {
    pub fn new(path: impl Into<String>, mtime: u64, size: u64) -> Self {
        Self {
            path: path.into(),
            mtime,
            size,
        }
    }
}

/// Compute the cache key of a chain fingerprint.
///
/// Order matters: the same files in a different chain order produce a
/// different key.
pub fn cache_key(fingerprint: &[FileStamp]) -> String {
    let rendered = fingerprint
        .iter()
        .map(|s| format!("{}:{}:{}", s.path, s.mtime, s.size))
        .collect::<Vec<_>>()
        .join("\n");

    let mut hasher = Sha256::new();
    hasher.update(rendered.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..CACHE_KEY_LEN].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamps() -> Vec<FileStamp> {
        vec![
            FileStamp::new("/clients/CONTEXT.md", 1_700_000_000_000_000_000, 120),
            FileStamp::new("/clients/acme/CONTEXT.md", 1_700_000_100_000_000_000, 64),
        ]
    }

    #[test]
    fn test_cache_key_is_stable() {
        assert_eq!(cache_key(&stamps()), cache_key(&stamps()));
        assert_eq!(cache_key(&stamps()).len(), CACHE_KEY_LEN);
    }

    #[test]
    fn test_cache_key_changes_with_mtime_or_size() {
        let base = cache_key(&stamps());

        let mut touched = stamps();
        touched[1].mtime += 1;
        assert_ne!(cache_key(&touched), base);

        let mut grown = stamps();
        grown[0].size += 1;
        assert_ne!(cache_key(&grown), base);
    }

    #[test]
    fn test_cache_key_depends_on_order_and_membership() {
        let base = cache_key(&stamps());
        let mut reversed = stamps();
        reversed.reverse();
        assert_ne!(cache_key(&reversed), base);

        let mut extended = stamps();
        extended.push(FileStamp::new("/clients/acme/web/CONTEXT.md", 1, 1));
        assert_ne!(cache_key(&extended), base);
    }

    #[test]
    fn test_empty_fingerprint_has_a_key() {
        assert_eq!(cache_key(&[]).len(), CACHE_KEY_LEN);
    }
}

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use hierarchy_context::{CacheManager, ResolverOptions};
use tempfile::TempDir;

struct Fixture {
    _tmp: TempDir,
    root: PathBuf,
    cache_dir: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("clients");
        let cache_dir = tmp.path().join("cache");
        let fx = Self {
            _tmp: tmp,
            root,
            cache_dir,
        };
        fx.write("_global", "---\ntype: client\n---\n## Rules\nbe kind\n");
        fx.write("acme", "---\ntype: client\n---\n## Tools\n- A\n");
        fx.write("acme/web", "---\ntype: project\n---\n## Tools\n- B\n");
        fx.write("acme/api", "---\ntype: project\n---\n## Tools\n- C\n");
        fs::create_dir_all(fx.root.join("acme/web/checkout")).unwrap();
        fx
    }

    fn write(&self, dir: &str, body: &str) {
        let dir = self.root.join(dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("CONTEXT.md"), body).unwrap();
    }

    fn manager(&self) -> CacheManager {
        CacheManager::new(ResolverOptions::new(&self.root), &self.cache_dir)
    }

    fn leaf(&self) -> PathBuf {
        self.root.join("acme/web/checkout")
    }
}

/// Move a file's mtime forward without changing its content.
fn touch(path: &Path) {
    let later = SystemTime::now() + Duration::from_secs(60);
    fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(later)
        .unwrap();
}

#[test]
fn test_idempotent_resolution() {
    let fx = Fixture::new();
    let cache = fx.manager();
    let first = cache.resolve(&fx.leaf());
    let second = cache.resolve(&fx.leaf());

    assert!(!first.hit);
    assert!(second.hit);
    assert_eq!(first.cache_key, second.cache_key);
    assert_eq!(first.effective(), second.effective());
    assert_eq!(first.node_id.as_deref(), Some("acme/web"));
}

#[test]
fn test_editing_a_chain_file_changes_key_and_context() {
    let fx = Fixture::new();
    let cache = fx.manager();
    let before = cache.resolve(&fx.leaf());

    fx.write("acme", "---\ntype: client\n---\n## Tools\n- A2\n");
    let after = cache.resolve(&fx.leaf());

    assert!(!after.hit);
    assert_ne!(before.cache_key, after.cache_key);
    assert_eq!(after.effective().sections["Tools"].content, "- A2\n\n- B");
}

#[test]
fn test_touching_a_chain_file_changes_key() {
    let fx = Fixture::new();
    let cache = fx.manager();
    let before = cache.resolve(&fx.leaf());

    touch(&fx.root.join("_global/CONTEXT.md"));
    let after = cache.resolve(&fx.leaf());

    assert!(!after.hit);
    assert_ne!(before.cache_key, after.cache_key);
    assert_eq!(before.effective(), after.effective());
}

#[test]
fn test_touching_outside_the_chain_keeps_key() {
    let fx = Fixture::new();
    let cache = fx.manager();
    let before = cache.resolve(&fx.leaf());

    fx.write("acme/api", "---\ntype: project\n---\n## Tools\n- changed\n");
    fs::write(fx.leaf().join("notes.md"), "scratch").unwrap();
    let after = cache.resolve(&fx.leaf());

    assert!(after.hit);
    assert_eq!(before.cache_key, after.cache_key);
}

#[test]
fn test_new_level_joins_the_chain() {
    let fx = Fixture::new();
    let cache = fx.manager();
    let before = cache.resolve(&fx.leaf());

    fx.write("acme/web/checkout", "---\ntype: sub_project\n---\n## Tools\n@override\n- D\n");
    let after = cache.resolve(&fx.leaf());

    assert_eq!(after.node_id.as_deref(), Some("acme/web/checkout"));
    assert_ne!(before.cache_key, after.cache_key);
    let tools = &after.effective().sections["Tools"];
    assert_eq!(tools.content, "- D");
    assert!(tools.is_override);
}

#[test]
fn test_removed_level_leaves_the_chain() {
    let fx = Fixture::new();
    let cache = fx.manager();
    let before = cache.resolve(&fx.leaf());

    fs::remove_file(fx.root.join("acme/CONTEXT.md")).unwrap();
    let after = cache.resolve(&fx.leaf());

    assert_ne!(before.cache_key, after.cache_key);
    assert_eq!(after.effective().sections["Tools"].content, "- B");
    assert_eq!(after.chain.len(), 2);
}

#[test]
fn test_leaves_are_cached_independently() {
    let fx = Fixture::new();
    let cache = fx.manager();
    let web = cache.resolve(&fx.leaf());
    let api = cache.resolve(&fx.root.join("acme/api"));

    fx.write("acme/api", "---\ntype: project\n---\n## Tools\n- C2\n");

    assert!(cache.resolve(&fx.leaf()).hit);
    let api_after = cache.resolve(&fx.root.join("acme/api"));
    assert!(!api_after.hit);
    assert_ne!(api.cache_key, api_after.cache_key);
    assert_ne!(web.cache_key, api_after.cache_key);
}

#[test]
fn test_concurrent_resolution_agrees() {
    let fx = Fixture::new();
    let cache = fx.manager();

    let results: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| cache.resolve(&fx.leaf())))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let key = &results[0].cache_key;
    for outcome in &results {
        assert_eq!(&outcome.cache_key, key);
        assert_eq!(outcome.effective(), results[0].effective());
    }
    assert!(cache.record_path("acme/web").unwrap().exists());
}

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn hctx_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("hctx");
    path
}

/// A query vector of `[1, 0]` scores a chunk vector `[x, sqrt(1 - x²)]` at
/// cosine similarity `x`.
fn chunk_line(handle: &str, path: &str, node_type: &str, similarity: f64) -> String {
    let depth = path.split('/').count();
    let y = (1.0 - similarity * similarity).sqrt();
    format!(
        r#"{{"content":"chunk {handle}","embedding_handle":"{handle}","hierarchy_path":"{path}","hierarchy_depth":{depth},"node_type":"{node_type}","embedding":[{similarity},{y}]}}"#
    )
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    let clients = root.join("clients");

    let write = |dir: &str, body: &str| {
        let dir = clients.join(dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("CONTEXT.md"), body).unwrap();
    };
    write("_global", "---\ntype: client\ntone: neutral\n---\n## Rules\nbe kind\n");
    write(
        "rescue",
        "---\ntype: client\ntags: [erp]\n---\n## Tools\n- A\n- B\n",
    );
    write(
        "rescue/erp",
        "---\ntype: project\ntags: {\"@additive\": [sap]}\n---\n## Tools\n@override\n- C\n",
    );
    write("rescue/hubspot", "---\ntype: project\n---\n## Tools\n- D\n");

    let chunks = [
        chunk_line("erp", "rescue/erp", "project", 0.70),
        chunk_line("rescue", "rescue", "client", 0.75),
        chunk_line("hubspot", "rescue/hubspot", "project", 0.99),
        chunk_line("reqs", "rescue/erp/sap/reqs", "milestone", 0.60),
    ]
    .join("\n");
    fs::write(root.join("chunks.jsonl"), chunks + "\n").unwrap();
    fs::write(root.join("query.json"), "[1.0, 0.0]").unwrap();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let config_content = format!(
        r#"[hierarchy]
clients_root = "{root}/clients"

[cache]
dir = "{root}/state/cache"

[registry]
path = "{root}/state/nodes.json"

[retrieval]
top_k = 10
milestone_ancestors = "include"
chunk_index = "{root}/chunks.jsonl"
"#,
        root = root.display()
    );
    let config_path = config_dir.join("hctx.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_hctx(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = hctx_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run hctx binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn clients_path(config_path: &Path, rel: &str) -> String {
    let root = config_path.parent().unwrap().parent().unwrap();
    root.join("clients").join(rel).display().to_string()
}

/// Hierarchy paths of ranked results, in printed order.
fn result_paths(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter(|l| l.chars().next().is_some_and(|c| c.is_ascii_digit()) && l.contains(". ["))
        .filter_map(|l| l.split_whitespace().nth(2).map(str::to_string))
        .collect()
}

#[test]
fn test_resolve_json_merges_chain() {
    let (_tmp, config_path) = setup_test_env();
    let leaf = clients_path(&config_path, "rescue/erp");

    let (stdout, stderr, success) = run_hctx(&config_path, &["resolve", &leaf]);
    assert!(success, "resolve failed: stdout={}, stderr={}", stdout, stderr);

    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["node_id"], "rescue/erp");
    assert_eq!(report["cache_hit"], false);
    assert_eq!(report["cache_key"].as_str().unwrap().len(), 16);
    assert_eq!(report["chain"].as_array().unwrap().len(), 3);
    assert_eq!(report["settings"]["tags"], serde_json::json!(["erp", "sap"]));
    assert_eq!(report["settings"]["tone"], "neutral");
    assert_eq!(report["settings"]["type"], "project");

    let tools = &report["sections"]["Tools"];
    assert_eq!(tools["content"], "- C");
    assert_eq!(tools["is_override"], true);
    assert_eq!(tools["sources"], serde_json::json!(["rescue/erp"]));
    assert_eq!(report["sections"]["Rules"]["content"], "be kind");
}

#[test]
fn test_resolve_twice_hits_cache() {
    let (_tmp, config_path) = setup_test_env();
    let leaf = clients_path(&config_path, "rescue/erp");

    let (first, _, _) = run_hctx(&config_path, &["resolve", &leaf]);
    let (second, _, success) = run_hctx(&config_path, &["resolve", &leaf]);
    assert!(success);

    let first: serde_json::Value = serde_json::from_str(&first).unwrap();
    let second: serde_json::Value = serde_json::from_str(&second).unwrap();
    assert_eq!(second["cache_hit"], true);
    assert_eq!(first["cache_key"], second["cache_key"]);
    assert_eq!(first["sections"], second["sections"]);
    assert_eq!(first["generated_at"], second["generated_at"]);
}

#[test]
fn test_resolve_markdown() {
    let (_tmp, config_path) = setup_test_env();
    let leaf = clients_path(&config_path, "rescue/hubspot");

    let (stdout, _, success) =
        run_hctx(&config_path, &["resolve", &leaf, "--format", "markdown"]);
    assert!(success);
    assert!(stdout.contains("## Tools"));
    assert!(stdout.contains("- A\n- B\n\n- D"));
    assert!(stdout.contains("## Rules"));
}

#[test]
fn test_resolve_rejects_unknown_format() {
    let (_tmp, config_path) = setup_test_env();
    let leaf = clients_path(&config_path, "rescue");
    let (_, stderr, success) = run_hctx(&config_path, &["resolve", &leaf, "--format", "yaml"]);
    assert!(!success);
    assert!(stderr.contains("Unknown format"));
}

#[test]
fn test_chain_lists_levels_root_first() {
    let (_tmp, config_path) = setup_test_env();
    let leaf = clients_path(&config_path, "rescue/erp");

    let (stdout, _, success) = run_hctx(&config_path, &["chain", &leaf]);
    assert!(success);
    let global = stdout.find("0. global").unwrap();
    let rescue = stdout.find("1. rescue").unwrap();
    let erp = stdout.find("2. rescue/erp").unwrap();
    assert!(global < rescue && rescue < erp);
    assert!(stdout.contains("cache_key: "));
}

#[test]
fn test_nodes_save_writes_registry() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_hctx(&config_path, &["nodes", "--save"]);
    assert!(success, "nodes failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("rescue (client)  [erp]"));
    assert!(stdout.contains("  rescue/erp (project)  [sap]"));
    assert!(stdout.contains("Saved 3 node(s)"));

    let saved = fs::read_to_string(tmp.path().join("state/nodes.json")).unwrap();
    let records: Vec<serde_json::Value> = serde_json::from_str(&saved).unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0]["id"], "rescue");
    assert_eq!(
        records[0]["children"],
        serde_json::json!(["rescue/erp", "rescue/hubspot"])
    );
}

#[test]
fn test_search_boost_reorders_and_filters_scope() {
    let (tmp, config_path) = setup_test_env();
    let query = tmp.path().join("query.json").display().to_string();

    let (stdout, stderr, success) = run_hctx(
        &config_path,
        &["search", "--vector-file", &query, "--scope", "rescue/erp"],
    );
    assert!(success, "search failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("scope=rescue/erp, ancestors=true, boost=true"));
    assert_eq!(
        result_paths(&stdout),
        vec!["rescue/erp", "rescue", "rescue/erp/sap/reqs"]
    );
}

#[test]
fn test_search_without_boost_uses_raw_similarity() {
    let (tmp, config_path) = setup_test_env();
    let query = tmp.path().join("query.json").display().to_string();

    let (stdout, _, success) = run_hctx(
        &config_path,
        &["search", "--vector-file", &query, "--scope", "rescue/erp", "--no-boost"],
    );
    assert!(success);
    assert!(stdout.contains("boost=false"));
    assert_eq!(
        result_paths(&stdout),
        vec!["rescue", "rescue/erp", "rescue/erp/sap/reqs"]
    );
}

#[test]
fn test_search_no_ancestors_keeps_descendants_only() {
    let (tmp, config_path) = setup_test_env();
    let query = tmp.path().join("query.json").display().to_string();

    let (stdout, _, success) = run_hctx(
        &config_path,
        &[
            "search",
            "--vector-file",
            &query,
            "--scope",
            "rescue/erp",
            "--no-ancestors",
        ],
    );
    assert!(success);
    assert_eq!(result_paths(&stdout), vec!["rescue/erp/sap/reqs"]);
}

#[test]
fn test_search_from_directory_derives_scope() {
    let (tmp, config_path) = setup_test_env();
    let query = tmp.path().join("query.json").display().to_string();
    let from = clients_path(&config_path, "rescue/hubspot");

    let (stdout, _, success) = run_hctx(
        &config_path,
        &["search", "--vector-file", &query, "--from", &from, "--top-k", "1"],
    );
    assert!(success);
    assert!(stdout.contains("scope=rescue/hubspot"));
    assert_eq!(result_paths(&stdout), vec!["rescue/hubspot"]);
}

#[test]
fn test_cache_clear() {
    let (_tmp, config_path) = setup_test_env();
    let leaf = clients_path(&config_path, "rescue/erp");
    run_hctx(&config_path, &["resolve", &leaf]);

    let (stdout, _, success) = run_hctx(&config_path, &["cache", "clear"]);
    assert!(success);
    assert!(stdout.contains("Removed 1 cache record(s)"));

    let (stdout, _, _) = run_hctx(&config_path, &["resolve", &leaf]);
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["cache_hit"], false);
}

#[test]
fn test_missing_milestone_policy_fails() {
    let (_tmp, config_path) = setup_test_env();
    let content = fs::read_to_string(&config_path).unwrap();
    fs::write(
        &config_path,
        content.replace("milestone_ancestors = \"include\"\n", ""),
    )
    .unwrap();

    let (_, stderr, success) = run_hctx(&config_path, &["nodes"]);
    assert!(!success);
    assert!(stderr.contains("milestone_ancestors"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_hctx(&tmp.path().join("nope.toml"), &["nodes"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn spectra_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("spectra");
    path
}

fn write(path: &Path, body: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let files = root.join("files");
    write(
        &files.join("kafka/README.md"),
        "# Kafka\n\nKafka brokers store partitions replicated across the cluster.\n\nEach partition has one leader broker.",
    );
    write(
        &files.join("kafka/seeds/replication.md"),
        "Replication copies partitions from the leader to follower brokers.",
    );
    write(
        &files.join("garden/notes.md"),
        "# Tomatoes\n\nTomatoes need full sun and steady watering.\n\nBasil grows well beside tomatoes.",
    );
    write(
        &files.join("garden/compost.md"),
        "Compost turns kitchen scraps into rich soil.",
    );

    let config_content = format!(
        r#"[corpus]
root = "{}/files"

[retrieval]
top_n = 5

[watcher]
enabled = false

[server]
bind = "127.0.0.1:7341"
"#,
        root.display()
    );

    let config_path = root.join("config/spectra.toml");
    write(&config_path, &config_content);

    (tmp, config_path)
}

fn run_spectra(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = spectra_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run spectra binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn run_json(config_path: &Path, args: &[&str]) -> serde_json::Value {
    let mut full = args.to_vec();
    full.push("--json");
    let (stdout, stderr, success) = run_spectra(config_path, &full);
    assert!(success, "{:?} failed: stdout={}, stderr={}", args, stdout, stderr);
    serde_json::from_str(&stdout).unwrap_or_else(|e| panic!("bad JSON ({}): {}", e, stdout))
}

#[test]
fn test_search_keyword() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_spectra(&config_path, &["search", "tomato watering"]);
    assert!(success, "search failed: {}", stderr);
    assert!(
        stdout.contains("garden / notes.md"),
        "Expected garden/notes.md in results, got: {}",
        stdout
    );
    assert!(stdout.contains("margin:"));
}

#[test]
fn test_search_json_shape() {
    let (_tmp, config_path) = setup_test_env();

    let value = run_json(&config_path, &["search", "partition leader"]);
    assert_eq!(value["mode"], "explore");
    let results = value["results"].as_array().unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0]["group"], "kafka");
    assert!(results[0]["confidence"].is_string());
    let margin = value["margin"].as_f64().unwrap();
    assert!((0.1..=100.0).contains(&margin));
}

#[test]
fn test_search_deterministic() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout1, _, _) = run_spectra(&config_path, &["search", "brokers partitions", "--json"]);
    let (stdout2, _, _) = run_spectra(&config_path, &["search", "brokers partitions", "--json"]);
    assert!(!stdout1.is_empty());
    assert_eq!(stdout1, stdout2);
}

#[test]
fn test_search_no_match_is_empty() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_spectra(&config_path, &["search", "xylophone"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_search_empty_query_rejected() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_spectra(&config_path, &["search", "  "]);
    assert!(!success);
    assert!(stderr.contains("query must not be empty"), "stderr: {}", stderr);
}

#[test]
fn test_search_bad_mode_rejected() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_spectra(&config_path, &["search", "kafka", "--mode", "fuzzy"]);
    assert!(!success);
    assert!(stderr.contains("fuzzy"));
}

#[test]
fn test_search_group_filter() {
    let (_tmp, config_path) = setup_test_env();

    let value = run_json(&config_path, &["search", "leader tomatoes", "--group", "garden"]);
    for result in value["results"].as_array().unwrap() {
        assert_eq!(result["group"], "garden");
    }
}

#[test]
fn test_search_external_uses_retrieve_mode() {
    let (tmp, config_path) = setup_test_env();
    let ext = tmp.path().join("papers");
    write(&ext.join("fog.md"), "Fog signals warned ships near the lighthouse.");
    write(&ext.join("keeper.md"), "The keeper trimmed wicks each night.");

    let value = run_json(
        &config_path,
        &[
            "search",
            "fog signals",
            "--external",
            ext.to_str().unwrap(),
            "--name",
            "papers",
        ],
    );
    assert_eq!(value["mode"], "retrieve");
    assert_eq!(value["results"][0]["group"], "papers");
    assert_eq!(value["results"][0]["subgroup"], "fog.md");
}

#[test]
fn test_search_external_relative_file() {
    let (tmp, config_path) = setup_test_env();
    let papers = tmp.path().join("papers");
    write(&papers.join("lighthouse.md"), "Fog signals warned ships near the lighthouse.");

    let output = Command::new(spectra_binary())
        .current_dir(&papers)
        .arg("--config")
        .arg(&config_path)
        .args(["search", "fog signals", "--external", "lighthouse.md", "--json"])
        .output()
        .unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        output.status.success(),
        "stdout={}, stderr={}",
        stdout,
        String::from_utf8_lossy(&output.stderr)
    );

    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["mode"], "retrieve");
    assert_eq!(value["results"][0]["group"], "lighthouse");
    assert_eq!(value["results"][0]["subgroup"], "lighthouse.md");
}

#[test]
fn test_search_external_missing_path() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_spectra(
        &config_path,
        &["search", "fog", "--external", "/no/such/papers"],
    );
    assert!(!success);
    assert!(stderr.contains("not found"), "stderr: {}", stderr);
}

#[test]
fn test_status() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_spectra(&config_path, &["status"]);
    assert!(success);
    assert!(stdout.contains("Chunks:"));
    assert!(stdout.contains("Vocabulary:"));

    let value = run_json(&config_path, &["status"]);
    assert_eq!(value["groups"], 2);
    assert_eq!(value["origin"], "default");
    assert_eq!(value["scope_mode"], "all");
    assert_eq!(value["watcher"], "stopped");
}

#[test]
fn test_reindex_reports_stats() {
    let (_tmp, config_path) = setup_test_env();

    let value = run_json(&config_path, &["reindex"]);
    // README: 2, replication: 1, notes: 2, compost: 1
    assert_eq!(value["chunks"], 6);
    assert_eq!(value["groups"], 2);
    assert_eq!(value["anchor_strategy"], "contrastive");
}

#[test]
fn test_orphans_and_duplicates() {
    let (_tmp, config_path) = setup_test_env();

    let orphans = run_json(&config_path, &["orphans", "--threshold", "0.0"]);
    let orphans = orphans.as_array().unwrap();
    assert!(orphans
        .iter()
        .any(|o| o["subgroup"] == "compost.md" && o["max_similarity"] == 0.0));

    let dups = run_json(&config_path, &["duplicates"]);
    assert!(dups.as_array().unwrap().is_empty());

    let (_, stderr, success) = run_spectra(&config_path, &["duplicates", "--threshold", "2.0"]);
    assert!(!success);
    assert!(stderr.contains("threshold"));
}

#[test]
fn test_coverage() {
    let (_tmp, config_path) = setup_test_env();

    let value = run_json(&config_path, &["coverage", "kafka"]);
    assert_eq!(value["group"], "kafka");
    assert_eq!(value["roots"], 2);
    assert_eq!(value["seeds"].as_array().unwrap().len(), 1);

    let (_, stderr, success) = run_spectra(&config_path, &["coverage", "nope"]);
    assert!(!success);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_similarity() {
    let (_tmp, config_path) = setup_test_env();

    let value = run_json(&config_path, &["similarity"]);
    let pairs = value.as_array().unwrap();
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0]["a"], "garden");
    assert_eq!(pairs[0]["b"], "kafka");
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_spectra(&tmp.path().join("nope.toml"), &["status"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

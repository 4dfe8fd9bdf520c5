use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn rbi_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("rbi");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/rbi.sqlite"

[provider]
force_offline = true

[llm]
offline_fragment_delay_ms = 0

[retrieval]
k = 15
max_k = 50

[history]
default_page_size = 50
max_page_size = 100

[server]
bind = "127.0.0.1:7441"
"#,
        root.display()
    );

    let config_path = config_dir.join("rbi.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_rbi(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = rbi_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("OPENAI_API_KEY")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run rbi binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

/// Create a bridge and return its id, parsed from the `id:` line.
fn create_bridge(config_path: &Path, name: &str) -> String {
    let (stdout, stderr, success) = run_rbi(config_path, &["bridge", "create", name]);
    assert!(success, "bridge create failed: {}", stderr);
    stdout
        .lines()
        .find_map(|l| l.trim().strip_prefix("id:"))
        .map(|id| id.trim().to_string())
        .expect("bridge create prints an id line")
}

#[test]
fn test_init_creates_database() {
    let (tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_rbi(&config, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("Database initialized"));
    assert!(tmp.path().join("data/rbi.sqlite").exists());
}

#[test]
fn test_init_is_idempotent() {
    let (_tmp, config) = setup_test_env();
    let (_, _, first) = run_rbi(&config, &["init"]);
    assert!(first);
    let (_, stderr, second) = run_rbi(&config, &["init"]);
    assert!(second, "second init failed: {}", stderr);
}

#[test]
fn test_bridge_create_prints_token_once() {
    let (_tmp, config) = setup_test_env();
    run_rbi(&config, &["init"]);

    let (stdout, _, success) = run_rbi(&config, &["bridge", "create", "Acme ↔ Contoso"]);
    assert!(success);
    assert!(stdout.contains("token:"));
    assert!(stdout.contains("gateway:  bridge-"));

    let token = stdout
        .lines()
        .find_map(|l| l.trim().strip_prefix("token:"))
        .map(|t| t.trim().to_string())
        .unwrap();

    let (list, _, success) = run_rbi(&config, &["bridge", "list"]);
    assert!(success);
    assert!(list.contains("Acme ↔ Contoso"));
    assert!(!list.contains(&token));
}

#[test]
fn test_bridge_create_rejects_blank_name() {
    let (_tmp, config) = setup_test_env();
    let (_, _, success) = run_rbi(&config, &["bridge", "create", "   "]);
    assert!(!success);
}

#[test]
fn test_list_without_bridges() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _, success) = run_rbi(&config, &["bridge", "list"]);
    assert!(success);
    assert!(stdout.contains("No bridges registered"));
}

#[test]
fn test_ingest_then_ask_offline() {
    let (_tmp, config) = setup_test_env();
    let id = create_bridge(&config, "acme");

    for text in [
        "deployment to staging finished",
        "production deployment status is green",
        "new logo mockups are ready",
    ] {
        let (stdout, stderr, success) = run_rbi(&config, &["ingest", &id, text]);
        assert!(success, "ingest failed: {}", stderr);
        assert!(stdout.contains("Stored message"));
    }

    let (stdout, stderr, success) = run_rbi(
        &config,
        &["ask", &id, "what's the deployment status?", "--k", "2"],
    );
    assert!(success, "ask failed: {}", stderr);
    assert!(stdout.contains("[Offline mode"));
    assert!(stdout.contains("Sources:"));
    assert!(stdout.contains("[1]"));
    assert!(stdout.contains("[2]"));
    assert!(!stdout.contains("[3]"));
    assert!(stdout.contains("[api] operator"));
}

#[test]
fn test_ask_stream_prints_answer_without_sources() {
    let (_tmp, config) = setup_test_env();
    let id = create_bridge(&config, "acme");
    run_rbi(&config, &["ingest", &id, "api freeze starts monday"]);

    let (stdout, stderr, success) =
        run_rbi(&config, &["ask", &id, "when is the api freeze?", "--stream"]);
    assert!(success, "ask --stream failed: {}", stderr);
    assert!(stdout.contains("[Offline mode"));
    assert!(!stdout.contains("Sources:"));
}

#[test]
fn test_ask_empty_bridge_has_no_context() {
    let (_tmp, config) = setup_test_env();
    let id = create_bridge(&config, "quiet");

    let (stdout, _, success) = run_rbi(&config, &["ask", &id, "anything new?"]);
    assert!(success);
    assert!(stdout.contains("I don't have any relevant context"));
    assert!(!stdout.contains("Sources:"));
}

#[test]
fn test_ingest_blank_text_is_skipped() {
    let (_tmp, config) = setup_test_env();
    let id = create_bridge(&config, "acme");

    let (stdout, _, success) = run_rbi(&config, &["ingest", &id, "   "]);
    assert!(success);
    assert!(stdout.contains("Skipped"));

    let (stdout, _, _) = run_rbi(&config, &["stats", &id]);
    assert!(stdout.contains("Messages:    0"));
}

#[test]
fn test_ingest_unknown_bridge_fails_without_retry() {
    let (_tmp, config) = setup_test_env();
    run_rbi(&config, &["init"]);
    let (_, stderr, success) = run_rbi(&config, &["ingest", "no-such-bridge", "hello"]);
    assert!(!success);
    assert!(stderr.contains("not found"), "stderr: {}", stderr);
}

#[test]
fn test_history_pages_newest_first() {
    let (_tmp, config) = setup_test_env();
    let id = create_bridge(&config, "acme");
    for text in ["first note", "second note", "third note"] {
        run_rbi(&config, &["ingest", &id, text, "--sender", "ana"]);
    }

    let (stdout, _, success) = run_rbi(&config, &["history", &id, "--page-size", "2"]);
    assert!(success);
    assert!(stdout.contains("Page 1 of 2 (3 messages)"));
    assert!(stdout.contains("[api] ana: third note"));
    assert!(!stdout.contains("first note"));

    let (stdout, _, success) =
        run_rbi(&config, &["history", &id, "--page", "2", "--page-size", "2"]);
    assert!(success);
    assert!(stdout.contains("first note"));
}

#[test]
fn test_history_rejects_page_zero() {
    let (_tmp, config) = setup_test_env();
    let id = create_bridge(&config, "acme");
    let (_, _, success) = run_rbi(&config, &["history", &id, "--page", "0"]);
    assert!(!success);
}

#[test]
fn test_stats_breakdown() {
    let (_tmp, config) = setup_test_env();
    let id = create_bridge(&config, "acme");
    run_rbi(&config, &["ingest", &id, "one"]);
    run_rbi(&config, &["ingest", &id, "two"]);

    let (stdout, stderr, success) = run_rbi(&config, &["stats", &id]);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("Bridge Stats"));
    assert!(stdout.contains("Messages:    2"));
    assert!(stdout.contains("api"));
    assert!(stdout.contains("Recent:"));
}

#[test]
fn test_stats_unknown_bridge() {
    let (_tmp, config) = setup_test_env();
    run_rbi(&config, &["init"]);
    let (_, stderr, success) = run_rbi(&config, &["stats", "missing"]);
    assert!(!success);
    assert!(stderr.contains("No bridge with id"));
}

#[test]
fn test_disable_enable_and_delete() {
    let (_tmp, config) = setup_test_env();
    let id = create_bridge(&config, "acme");
    run_rbi(&config, &["ingest", &id, "kept until delete"]);

    let (stdout, _, success) = run_rbi(&config, &["bridge", "disable", &id]);
    assert!(success);
    assert!(stdout.contains("disabled"));
    let (list, _, _) = run_rbi(&config, &["bridge", "list"]);
    assert!(list.contains("off"));

    let (_, _, success) = run_rbi(&config, &["bridge", "enable", &id]);
    assert!(success);

    let (_, _, success) = run_rbi(&config, &["bridge", "delete", &id]);
    assert!(success);
    let (_, _, success) = run_rbi(&config, &["stats", &id]);
    assert!(!success);
    let (_, _, success) = run_rbi(&config, &["bridge", "delete", &id]);
    assert!(!success);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");
    let (_, _, success) = run_rbi(&missing, &["init"]);
    assert!(!success);
}

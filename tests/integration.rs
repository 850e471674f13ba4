use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn feeds_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("feeds");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/feeds.sqlite"

[embedding]
provider = "mock"
dims = 64

[versioning]
similarity_threshold = 0.95
"#,
        root.display()
    );

    let config_path = config_dir.join("feeds.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_feeds(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = feeds_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run feeds binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

/// Ingest a text document and return its id (parsed from the report).
fn ingest_text(config_path: &Path, name: &str, content: &str) -> String {
    let (stdout, stderr, success) = run_feeds(
        config_path,
        &["ingest", "text", name, content, "--owner", "user-1"],
    );
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    stdout
        .lines()
        .find_map(|l| l.trim().strip_prefix("document: "))
        .expect("report should include the document id")
        .to_string()
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_feeds(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_feeds(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_feeds(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_and_list() {
    let (_tmp, config_path) = setup_test_env();
    run_feeds(&config_path, &["init"]);

    let id = ingest_text(
        &config_path,
        "notes-1",
        "Contact john@example.com for the Q3 report",
    );

    let (stdout, _, success) = run_feeds(&config_path, &["list", "--owner", "user-1"]);
    assert!(success);
    assert!(stdout.contains(&id));
    assert!(stdout.contains("notes-1"));
    assert!(stdout.contains("v1"));
}

#[test]
fn test_resubmission_is_skipped() {
    let (_tmp, config_path) = setup_test_env();
    run_feeds(&config_path, &["init"]);

    let text = "Contact john@example.com for the Q3 report";
    ingest_text(&config_path, "notes-1", text);

    let (stdout, _, success) = run_feeds(
        &config_path,
        &["ingest", "text", "notes-1", text, "--owner", "user-1"],
    );
    assert!(success);
    assert!(stdout.contains("skipped"));
    assert!(stdout.contains("version: 1"));
}

#[test]
fn test_changed_content_bumps_version() {
    let (_tmp, config_path) = setup_test_env();
    run_feeds(&config_path, &["init"]);

    let id = ingest_text(&config_path, "notes-1", "original body text here");
    let (stdout, _, _) = run_feeds(
        &config_path,
        &[
            "ingest",
            "text",
            "notes-1",
            "a completely different body now",
            "--owner",
            "user-1",
        ],
    );
    assert!(stdout.contains("status: updated"));
    assert!(stdout.contains("version: 2"));

    let (stdout, _, success) =
        run_feeds(&config_path, &["versions", &id, "--owner", "user-1"]);
    assert!(success);
    assert!(stdout.contains("v1"));
}

#[test]
fn test_show_prints_content_and_metadata() {
    let (_tmp, config_path) = setup_test_env();
    run_feeds(&config_path, &["init"]);

    let id = ingest_text(&config_path, "notes-1", "Reach me at a@b.co");

    let (stdout, _, success) = run_feeds(&config_path, &["show", &id, "--owner", "user-1"]);
    assert!(success);
    assert!(stdout.contains("Reach me at a@b.co"));
    assert!(stdout.contains("direct"));
    assert!(stdout.contains("char_count"));
}

#[test]
fn test_delete_restore_and_audit() {
    let (_tmp, config_path) = setup_test_env();
    run_feeds(&config_path, &["init"]);

    let id = ingest_text(&config_path, "notes-1", "body to delete");

    let (stdout, _, success) = run_feeds(
        &config_path,
        &["delete", &id, "--owner", "user-1", "--reason", "cleanup"],
    );
    assert!(success, "delete failed: {}", stdout);

    // Gone from the default listing, present in --deleted.
    let (stdout, _, _) = run_feeds(&config_path, &["list", "--owner", "user-1"]);
    assert!(stdout.contains("No documents."));
    let (stdout, _, _) = run_feeds(&config_path, &["list", "--owner", "user-1", "--deleted"]);
    assert!(stdout.contains(&id));

    // One audit entry with the reason.
    let (stdout, _, success) = run_feeds(&config_path, &["audit", "--document", &id]);
    assert!(success);
    assert!(stdout.contains("cleanup"));

    let (stdout, _, success) = run_feeds(&config_path, &["restore", &id, "--owner", "user-1"]);
    assert!(success, "restore failed: {}", stdout);

    let (stdout, _, _) = run_feeds(&config_path, &["list", "--owner", "user-1"]);
    assert!(stdout.contains(&id));
}

#[test]
fn test_search_finds_similar_document() {
    let (_tmp, config_path) = setup_test_env();
    run_feeds(&config_path, &["init"]);

    let id = ingest_text(&config_path, "runbook", "deployment runbook for the cluster");
    ingest_text(&config_path, "budget", "quarterly budget planning notes");

    let (stdout, _, success) = run_feeds(
        &config_path,
        &[
            "search",
            "deployment runbook for the cluster",
            "--owner",
            "user-1",
            "--limit",
            "1",
        ],
    );
    assert!(success);
    assert!(stdout.contains(&id), "expected {} in:\n{}", id, stdout);
}

#[test]
fn test_ingest_csv_file() {
    let (tmp, config_path) = setup_test_env();
    run_feeds(&config_path, &["init"]);

    let csv_path = tmp.path().join("contacts.csv");
    fs::write(&csv_path, "name,email\nAda,ada@example.com\n").unwrap();

    let (stdout, stderr, success) = run_feeds(
        &config_path,
        &[
            "ingest",
            "file",
            csv_path.to_str().unwrap(),
            "--owner",
            "user-1",
        ],
    );
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("status: created"));
    assert!(stdout.contains("concepts: 1"));
}

#[test]
fn test_unsupported_extension_rejected() {
    let (tmp, config_path) = setup_test_env();
    run_feeds(&config_path, &["init"]);

    let path = tmp.path().join("report.pdf");
    fs::write(&path, b"%PDF-1.4").unwrap();

    let (stdout, stderr, success) = run_feeds(
        &config_path,
        &[
            "ingest",
            "file",
            path.to_str().unwrap(),
            "--owner",
            "user-1",
        ],
    );
    assert!(!success, "expected failure, got: {}", stdout);
    assert!(
        stderr.contains("unsupported source kind"),
        "stderr was: {}",
        stderr
    );
}

//! Integration tests for cadence-queue commands

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to escape path for TOML on Windows
fn escape_path_for_toml(path: &str) -> String {
    path.replace('\\', "\\\\")
}

/// Helper to create a test environment with config and database path
fn setup_test_env() -> (TempDir, String) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let db_path = temp_dir.path().join("data").join("cadence.db");

    let config_content = format!(
        r#"
[database]
path = "{}"

[defaults]
user_id = "alice"
timezone = "UTC"
"#,
        escape_path_for_toml(&db_path.to_string_lossy())
    );
    fs::write(&config_path, config_content).unwrap();

    (temp_dir, config_path.to_string_lossy().to_string())
}

fn queue(config_path: &str) -> Command {
    let mut cmd = Command::cargo_bin("cadence-queue").unwrap();
    cmd.env("CADENCE_CONFIG", config_path)
        .env_remove("CADENCE_DB_PATH")
        .env_remove("CADENCE_USER");
    cmd
}

fn create(config_path: &str, args: &[&str]) -> String {
    let output = queue(config_path).arg("create").args(args).output().unwrap();
    assert!(
        output.status.success(),
        "create failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

fn show_json(config_path: &str, post_id: &str) -> serde_json::Value {
    let output = queue(config_path)
        .args(["show", post_id, "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_create_draft_then_schedule() {
    let (_temp, config) = setup_test_env();
    let id = create(&config, &["--platform", "linkedin", "--draft", "Hello LinkedIn"]);

    let post = show_json(&config, &id);
    assert_eq!(post["status"], "draft");
    assert_eq!(post["user_id"], "alice");

    queue(&config)
        .args(["schedule", &id, "2030-01-01 09:00", "--timezone", "Asia/Jakarta"])
        .assert()
        .success()
        .stdout(predicate::str::contains("status:       queued"))
        .stdout(predicate::str::contains("2030-01-01 09:00 WIB"));

    let post = show_json(&config, &id);
    assert_eq!(post["status"], "queued");
    assert_eq!(post["timezone"], "Asia/Jakarta");
}

#[test]
fn test_create_reads_content_from_stdin() {
    let (_temp, config) = setup_test_env();
    let output = queue(&config)
        .args(["create", "--platform", "threads", "--at", "1h"])
        .write_stdin("From a pipe\n")
        .output()
        .unwrap();
    assert!(output.status.success());
    let id = String::from_utf8(output.stdout).unwrap().trim().to_string();

    let post = show_json(&config, &id);
    assert_eq!(post["content"], "From a pipe");
    assert_eq!(post["status"], "queued");
}

#[test]
fn test_content_over_platform_limit_is_invalid_input() {
    let (_temp, config) = setup_test_env();
    let long = "x".repeat(501);

    queue(&config)
        .args(["create", "--platform", "threads", &long])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("500 character limit"));
}

#[test]
fn test_unknown_platform_is_invalid_input() {
    let (_temp, config) = setup_test_env();

    queue(&config)
        .args(["create", "--platform", "myspace", "hi"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Unknown platform"));
}

#[test]
fn test_cancelled_post_cannot_be_rescheduled() {
    let (_temp, config) = setup_test_env();
    let id = create(&config, &["--platform", "threads", "--at", "2h", "Soon"]);

    queue(&config).args(["cancel", &id]).assert().success();
    queue(&config)
        .args(["schedule", &id, "3h"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("while it is cancelled"));

    queue(&config).args(["delete", &id]).assert().success();
    queue(&config).args(["show", &id]).assert().code(3);
}

#[test]
fn test_unschedule_and_edit() {
    let (_temp, config) = setup_test_env();
    let id = create(&config, &["--platform", "linkedin", "--at", "1d", "First draft"]);

    queue(&config).args(["unschedule", &id]).assert().success();
    queue(&config)
        .args(["edit", &id, "Second draft"])
        .assert()
        .success();

    let post = show_json(&config, &id);
    assert_eq!(post["status"], "draft");
    assert_eq!(post["content"], "Second draft");
}

#[test]
fn test_retry_requires_failed_post() {
    let (_temp, config) = setup_test_env();
    let id = create(&config, &["--platform", "linkedin", "Queued"]);

    queue(&config)
        .args(["retry", &id])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("cannot retry"));
}

#[test]
fn test_list_filters_and_json_output() {
    let (_temp, config) = setup_test_env();
    create(&config, &["--platform", "linkedin", "--draft", "One"]);
    create(&config, &["--platform", "threads", "--at", "1h", "Two"]);
    create(&config, &["--platform", "threads", "--at", "2h", "Three"]);

    let output = queue(&config)
        .args(["list", "--platform", "threads", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let posts: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(posts.as_array().unwrap().len(), 2);

    queue(&config)
        .args(["list", "--status", "draft"])
        .assert()
        .success()
        .stdout(predicate::str::contains("| linkedin | draft |"))
        .stdout(predicate::str::contains("One"))
        .stdout(predicate::str::contains("Two").not());
}

#[test]
fn test_posts_are_scoped_to_user() {
    let (_temp, config) = setup_test_env();
    let id = create(&config, &["--platform", "linkedin", "--draft", "Private"]);

    queue(&config)
        .args(["show", &id, "--user", "mallory"])
        .assert()
        .code(3);

    queue(&config)
        .env("CADENCE_USER", "mallory")
        .args(["list", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::diff("[]\n"));
}

#[test]
fn test_stats_and_log() {
    let (_temp, config) = setup_test_env();
    let id = create(&config, &["--platform", "linkedin", "--draft", "A"]);
    create(&config, &["--platform", "threads", "B"]);
    queue(&config).args(["cancel", &id]).assert().success();

    let output = queue(&config)
        .args(["stats", "--format", "json"])
        .output()
        .unwrap();
    let stats: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(stats["queued"], 1);
    assert_eq!(stats["cancelled"], 1);
    assert_eq!(stats["total"], 2);

    queue(&config)
        .args(["log", "-n", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("post_cancelled"))
        .stdout(predicate::str::contains("post_created"));
}

#[test]
fn test_invalid_format_is_rejected_by_parser() {
    let (_temp, config) = setup_test_env();

    queue(&config)
        .args(["stats", "--format", "yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_verbose_logs_to_stderr_only() {
    let (_temp, config) = setup_test_env();

    queue(&config)
        .env_remove("RUST_LOG")
        .env_remove("CADENCE_LOG_LEVEL")
        .args(["--verbose", "list", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::diff("[]\n"))
        .stderr(predicate::str::contains("Managing posts"))
        .stderr(predicate::str::contains("user=alice"));
}

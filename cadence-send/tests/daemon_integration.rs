//! Integration tests for cadence-send daemon

use assert_cmd::Command;
use libcadence::service::posts::{NewPost, PostService};
use libcadence::{Database, Platform, PostStatus, SystemClock};
use predicates::prelude::*;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

/// Write a config pointing at a fresh database inside a temp dir
fn setup_test_env(extra: &str) -> (TempDir, String, String) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let db_path = temp_dir.path().join("test.db");

    let config_content = format!(
        r#"
[database]
path = "{}"

[scheduling]
poll_interval = 1

[scheduling.rate_limits.linkedin]
posts_per_hour = 5
replies_per_hour = 10
{}
"#,
        db_path.display().to_string().replace('\\', "/"),
        extra
    );
    fs::write(&config_path, config_content).unwrap();

    (
        temp_dir,
        config_path.to_str().unwrap().to_string(),
        db_path.to_str().unwrap().to_string(),
    )
}

async fn post_service(db_path: &str) -> PostService {
    let db = Database::new(db_path).await.unwrap();
    PostService::new(db, Arc::new(SystemClock), "UTC")
}

fn send(config_path: &str) -> Command {
    let mut cmd = Command::cargo_bin("cadence-send").unwrap();
    cmd.env("CADENCE_CONFIG", config_path)
        .env_remove("CADENCE_DB_PATH")
        .env("CADENCE_LOG_LEVEL", "warn");
    cmd
}

#[test]
fn test_help_describes_both_loops() {
    Command::cargo_bin("cadence-send")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("dispatch loop"))
        .stdout(predicate::str::contains("reply loop"));
}

#[tokio::test]
async fn test_once_without_publisher_leaves_due_post_queued() {
    let (_temp, config_path, db_path) = setup_test_env("");
    let posts = post_service(&db_path).await;
    let post = posts
        .create(NewPost::text("local", Platform::LinkedIn, "Due now"))
        .await
        .unwrap();

    let output = send(&config_path).arg("--once").output().unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["dispatch"]["due"], 1);
    assert_eq!(report["dispatch"]["skipped"], 1);
    assert_eq!(report["dispatch"]["dispatched"], 0);

    let stored = posts.get("local", &post.id).await.unwrap();
    assert_eq!(stored.status, PostStatus::Queued);
}

#[tokio::test]
async fn test_once_ignores_future_and_draft_posts() {
    let (_temp, config_path, db_path) = setup_test_env("");
    let posts = post_service(&db_path).await;
    posts
        .create(NewPost {
            scheduled_at: Some("2h".to_string()),
            ..NewPost::text("local", Platform::Threads, "Later")
        })
        .await
        .unwrap();
    posts
        .create(NewPost {
            draft: true,
            ..NewPost::text("local", Platform::Threads, "Not yet")
        })
        .await
        .unwrap();

    let output = send(&config_path).arg("--once").output().unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["dispatch"]["due"], 0);
}

#[test]
fn test_no_replies_flag_skips_reply_poll() {
    let (_temp, config_path, _db_path) = setup_test_env("");

    let output = send(&config_path)
        .args(["--once", "--no-replies"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(report["replies"].is_null());
    assert_eq!(report["dispatch"]["due"], 0);
}

#[test]
fn test_invalid_rate_limit_is_configuration_error() {
    let (_temp, config_path, _db_path) = setup_test_env("");
    let content = fs::read_to_string(&config_path)
        .unwrap()
        .replace("posts_per_hour = 5", "posts_per_hour = 7");
    fs::write(&config_path, content).unwrap();

    send(&config_path)
        .arg("--once")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("posts_per_hour"));
}

#[test]
fn test_unreadable_gateway_token_fails_startup() {
    let (_temp, config_path, _db_path) = setup_test_env(
        r#"
[publisher]
endpoint = "http://127.0.0.1:9"
token_file = "/nonexistent/cadence/gateway.token"
"#,
    );

    send(&config_path).arg("--once").assert().code(2);
}

//! Integration tests for cadence-rules commands

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn setup_test_env() -> (TempDir, String) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let db_path = temp_dir.path().join("cadence.db");

    let config_content = format!(
        r#"
[database]
path = "{}"

[defaults]
user_id = "alice"
"#,
        db_path.to_string_lossy().replace('\\', "\\\\")
    );
    fs::write(&config_path, config_content).unwrap();

    (temp_dir, config_path.to_string_lossy().to_string())
}

fn rules(config_path: &str) -> Command {
    let mut cmd = Command::cargo_bin("cadence-rules").unwrap();
    cmd.env("CADENCE_CONFIG", config_path)
        .env_remove("CADENCE_DB_PATH")
        .env_remove("CADENCE_USER");
    cmd
}

fn add_rule(config_path: &str, keyword: &str, reply: &str) -> String {
    let output = rules(config_path)
        .args(["add", "--platform", "linkedin", "--keyword", keyword, "--reply", reply])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "add failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

fn test_json(config_path: &str, text: &str, author: &str) -> serde_json::Value {
    let output = rules(config_path)
        .args(["test", "--platform", "linkedin", "--author", author, "--format", "json", text])
        .output()
        .unwrap();
    assert!(output.status.success());
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_longest_keyword_wins() {
    let (_temp, config) = setup_test_env();
    add_rule(&config, "price", "Short answer");
    add_rule(&config, "price list", "Hi {author}, here is the price list");

    let result = test_json(&config, "Can I see the PRICE LIST?", "@bob");
    assert_eq!(result["outcome"], "fire");
    assert_eq!(result["keyword"], "price list");
    assert_eq!(result["reply"], "Hi bob, here is the price list");
}

#[test]
fn test_stop_word_suppresses_matching_comment() {
    let (_temp, config) = setup_test_env();
    add_rule(&config, "price", "See website");

    rules(&config)
        .args(["stopword", "add", "--platform", "linkedin", "Refund"])
        .assert()
        .success();

    let result = test_json(&config, "price of a refund?", "bob");
    assert_eq!(result["outcome"], "suppressed");
    assert_eq!(result["stop_word"], "Refund");

    rules(&config)
        .args(["stopword", "add", "--platform", "linkedin", "refund"])
        .assert()
        .code(3);

    rules(&config)
        .args(["stopword", "remove", "--platform", "linkedin", "REFUND"])
        .assert()
        .success();
    assert_eq!(test_json(&config, "price of a refund?", "bob")["outcome"], "fire");
}

#[test]
fn test_disabled_rule_does_not_match() {
    let (_temp, config) = setup_test_env();
    let id = add_rule(&config, "demo", "Book a demo at example.com");

    rules(&config)
        .args(["update", &id, "--disable"])
        .assert()
        .success()
        .stdout(predicate::str::contains("disabled"));
    assert_eq!(test_json(&config, "can I get a demo", "bob")["outcome"], "no_match");

    rules(&config).args(["update", &id, "--enable"]).assert().success();
    assert_eq!(test_json(&config, "can I get a demo", "bob")["outcome"], "fire");
}

#[test]
fn test_list_and_delete() {
    let (_temp, config) = setup_test_env();
    let id = add_rule(&config, "hiring", "Check our careers page");

    rules(&config)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("| linkedin | active | hiring |"));

    rules(&config).args(["delete", &id]).assert().success();
    rules(&config).args(["delete", &id]).assert().code(3);

    rules(&config)
        .args(["list", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::diff("[]\n"));
}

#[test]
fn test_rules_are_scoped_to_user() {
    let (_temp, config) = setup_test_env();
    let id = add_rule(&config, "price", "See website");

    rules(&config)
        .args(["delete", &id, "--user", "mallory"])
        .assert()
        .code(3);

    let output = rules(&config)
        .args(["test", "--platform", "linkedin", "--user", "mallory", "--format", "json", "price?"])
        .output()
        .unwrap();
    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["outcome"], "no_match");
}

#[test]
fn test_empty_keyword_is_invalid_input() {
    let (_temp, config) = setup_test_env();

    rules(&config)
        .args(["add", "--platform", "threads", "--keyword", "  ", "--reply", "x"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Keyword is required"));
}

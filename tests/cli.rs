//! End-to-end runs of the schemapilot binary against a temporary store

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const RAW_SCHEMA: &str = r#"[
  {"id": 7, "name": "Shop", "engine": "postgres", "tables": [
    {"id": 1, "name": "users", "schema": "public", "description": "Registered customers",
     "fields": [{"id": 11, "name": "id", "database_type": "int4"},
                {"id": 12, "name": "email", "database_type": "text"}]},
    {"id": 2, "name": "orders", "schema": "public",
     "fields": [{"id": 20, "name": "id", "database_type": "int4"},
                {"id": 21, "name": "user_id", "database_type": "int4", "target_table_id": 1, "target_column_id": 11}]},
    {"id": 3, "name": "raw_events", "schema": "staging",
     "fields": [{"id": 30, "name": "payload", "database_type": "jsonb"}]}
  ]}
]"#;

/// Settings file pointing the store into a temp directory
fn workspace() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    let store = dir.path().join("data").join("store.db");
    std::fs::write(&config, format!("store_path = {:?}\n", store.to_string_lossy())).unwrap();
    (dir, config)
}

fn schemapilot(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("schemapilot").unwrap();
    cmd.arg("--config")
        .arg(config)
        .env_remove("RUST_LOG")
        .env_remove("SCHEMAPILOT_API_KEY");
    cmd
}

fn extract(dir: &TempDir, config: &Path) {
    let raw = dir.path().join("raw.json");
    std::fs::write(&raw, RAW_SCHEMA).unwrap();
    schemapilot(config)
        .args(["extract", "--file"])
        .arg(&raw)
        .assert()
        .success()
        .stdout(predicate::str::contains("[7] Shop: 3/3 tables selected"));
}

#[test]
fn models_lists_registry() {
    let (_dir, config) = workspace();
    schemapilot(&config)
        .arg("models")
        .assert()
        .success()
        .stdout(predicate::str::contains("gpt-4o"))
        .stdout(predicate::str::contains("claude-haiku-3-5"))
        .stdout(predicate::str::contains("gemini-2.5-flash"));
}

#[test]
fn show_before_extract() {
    let (_dir, config) = workspace();
    schemapilot(&config)
        .args(["schema", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No schema extracted yet"));
}

#[test]
fn extract_then_edit_selection() {
    let (dir, config) = workspace();
    extract(&dir, &config);

    schemapilot(&config)
        .args(["schema", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("public.users:"))
        .stdout(predicate::str::contains("foreign_key_target: public.users.id"))
        .stdout(predicate::str::contains("staging.raw_events:"));

    schemapilot(&config)
        .args(["schema", "deselect", "7", "staging.raw_events"])
        .assert()
        .success();

    schemapilot(&config)
        .args(["schema", "show", "--database", "7"])
        .assert()
        .success()
        .stdout(predicate::str::contains("raw_events").not());

    schemapilot(&config)
        .args(["schema", "show", "--options"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[ ] staging.raw_events"))
        .stdout(predicate::str::contains("[x] public.users"));

    // Re-extraction keeps the manual choice
    extract_again(&dir, &config);
}

fn extract_again(dir: &TempDir, config: &Path) {
    schemapilot(config)
        .args(["extract", "--file"])
        .arg(dir.path().join("raw.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("[7] Shop: 2/3 tables selected"));
}

#[test]
fn deselect_unknown_table_fails() {
    let (dir, config) = workspace();
    extract(&dir, &config);

    schemapilot(&config)
        .args(["schema", "deselect", "7", "public.ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("public.ghost"));
}

#[test]
fn use_unknown_model_fails() {
    let (_dir, config) = workspace();
    schemapilot(&config)
        .args(["provider", "use", "openai", "--model", "gpt-2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown model: gpt-2"));
}

#[test]
fn ask_without_schema_fails() {
    let (_dir, config) = workspace();
    schemapilot(&config)
        .args(["ask", "--database", "7", "count users"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No schema for database 7"));
}

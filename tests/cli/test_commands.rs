use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const NOOP_SCHEMA: &str = r#"
name: cli-noop
input: { name: inline, params: { keys: [a.txt, b.txt] } }
batcher: { name: single, params: { title_prefix: Touch } }
transformer: { name: command, params: { command: "true" } }
validator: { name: command, params: { command: "true" } }
submitter: { name: noop }
options:
  retry: { backoff_ms: 0 }
"#;

fn autoshift(workspace: &Path) -> Command {
    let mut cmd = Command::cargo_bin("autoshift").unwrap();
    cmd.current_dir(workspace)
        .env_remove("CI")
        .env_remove("AUTOSHIFT_LEDGER_DIR")
        .env_remove("AUTOSHIFT_CONCURRENCY")
        .env_remove("AUTOSHIFT_MAX_RETRIES")
        .env_remove("AUTOSHIFT_DRY_RUN");
    cmd
}

fn write_schema(workspace: &Path, name: &str, text: &str) -> PathBuf {
    let path = workspace.join(name);
    fs::write(&path, text).unwrap();
    path
}

#[test]
fn test_help_lists_commands() {
    let temp = TempDir::new().unwrap();
    autoshift(temp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("run")
                .and(predicate::str::contains("validate"))
                .and(predicate::str::contains("status"))
                .and(predicate::str::contains("components")),
        );
}

#[test]
fn test_run_command_help() {
    let temp = TempDir::new().unwrap();
    autoshift(temp.path())
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dry-run").and(predicate::str::contains("--concurrency")));
}

#[test]
fn test_components_lists_builtins() {
    let temp = TempDir::new().unwrap();
    autoshift(temp.path())
        .arg("components")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("key_hash_shard")
                .and(predicate::str::contains("extra_data"))
                .and(predicate::str::contains("github"))
                .and(predicate::str::contains("codeowners"))
                .and(predicate::str::contains("file_regex"))
                .and(predicate::str::contains("git_grep")),
        );

    let output = autoshift(temp.path())
        .args(["components", "--format", "json"])
        .output()
        .unwrap();
    let catalog: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(catalog["submitter"]
        .as_array()
        .unwrap()
        .contains(&serde_json::json!("noop")));
}

#[test]
fn test_validate_reports_resolved_components() {
    let temp = TempDir::new().unwrap();
    let schema = write_schema(temp.path(), "schema.yaml", NOOP_SCHEMA);

    autoshift(temp.path())
        .arg("validate")
        .arg(&schema)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Schema 'cli-noop' is valid")
                .and(predicate::str::contains("submitter:   noop")),
        );
}

#[test]
fn test_validate_rejects_incomplete_schema() {
    let temp = TempDir::new().unwrap();
    let schema = write_schema(
        temp.path(),
        "schema.yaml",
        &NOOP_SCHEMA.replace("submitter: { name: noop }\n", ""),
    );

    autoshift(temp.path())
        .arg("validate")
        .arg(&schema)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("AS-LOAD-002"));
}

#[test]
fn test_run_then_rerun_skips_submitted_batches() {
    let temp = TempDir::new().unwrap();
    let schema = write_schema(temp.path(), "schema.yaml", NOOP_SCHEMA);

    autoshift(temp.path())
        .arg("run")
        .arg(&schema)
        .arg("--workspace")
        .arg(temp.path())
        .assert()
        .success()
        .stdout(
            predicate::str::contains("submitted=2").and(predicate::str::contains("Touch a.txt")),
        );
    assert!(temp.path().join(".autoshift/ledger/ledger.json").exists());

    autoshift(temp.path())
        .arg("run")
        .arg(&schema)
        .arg("--workspace")
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("skipped=2"));

    let output = autoshift(temp.path())
        .args(["status", "--format", "json", "--workspace"])
        .arg(temp.path())
        .output()
        .unwrap();
    assert!(output.status.success());
    let status: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(status["manifest"]["schema_name"], "cli-noop");
    let records = status["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|record| record["outcome"] == "submitted"));
}

#[test]
fn test_failed_batches_exit_with_one() {
    let temp = TempDir::new().unwrap();
    let schema = write_schema(
        temp.path(),
        "schema.yaml",
        &NOOP_SCHEMA.replace(
            "validator: { name: command, params: { command: \"true\" } }",
            "validator: { name: command, params: { command: \"false\" } }",
        ),
    );

    autoshift(temp.path())
        .arg("run")
        .arg(&schema)
        .arg("--workspace")
        .arg(temp.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("validation_failed=2"));
}

#[test]
fn test_dry_run_json_report_submits_nothing() {
    let temp = TempDir::new().unwrap();
    let schema = write_schema(temp.path(), "schema.yaml", NOOP_SCHEMA);
    let ledger = temp.path().join("custom-ledger");

    let output = autoshift(temp.path())
        .arg("run")
        .arg(&schema)
        .arg("--workspace")
        .arg(temp.path())
        .arg("--ledger")
        .arg(&ledger)
        .args(["--dry-run", "--format", "json", "--quiet"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["dry_run"], true);
    assert_eq!(report["counts"]["pending"], 2);
    assert_eq!(report["counts"]["submitted"], 0);
    assert!(ledger.join("ledger.json").exists());
}

#[test]
fn test_missing_schema_file_is_an_error() {
    let temp = TempDir::new().unwrap();
    autoshift(temp.path())
        .args(["run", "does-not-exist.yaml", "--workspace"])
        .arg(temp.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("AS-LOAD-001"));
}

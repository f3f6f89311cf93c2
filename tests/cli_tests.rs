//! Integration tests for the groupexec CLI
//!
//! These tests run the actual binary and only use offline commands.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Get the binary to test
fn groupexec_cmd() -> Command {
    let mut cmd = Command::cargo_bin("groupexec").unwrap();
    cmd.env_remove("GROUPEXEC_SERVER_URL")
        .env_remove("GROUPEXEC_CLIENT_ID")
        .env("RUST_LOG", "error");
    cmd
}

#[test]
fn test_help_flag() {
    groupexec_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Run node groups in sequence"));
}

#[test]
fn test_run_help_lists_modes() {
    groupexec_cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--groups"))
        .stdout(predicate::str::contains("backend"));
}

// ============================================================================
// Plan validation
// ============================================================================

#[test]
fn test_validate_plan() {
    let temp_dir = TempDir::new().unwrap();
    let plan_file = temp_dir.path().join("plan.yaml");
    fs::write(
        &plan_file,
        r#"
items:
  - group_name: Base
    repeat_count: 2
    delay_seconds: 1
  - group_name: __delay__
    delay_seconds: 3
  - group_name: Upscale
"#,
    )
    .unwrap();

    groupexec_cmd()
        .arg("validate")
        .arg(&plan_file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Plan is valid"))
        .stdout(predicate::str::contains("Items: 3"))
        .stdout(predicate::str::contains("Tasks: 3"))
        .stdout(predicate::str::contains("Upscale"));
}

#[test]
fn test_validate_json_list_plan() {
    let temp_dir = TempDir::new().unwrap();
    let plan_file = temp_dir.path().join("plan.json");
    fs::write(&plan_file, r#"[{"group_name": "A", "repeat_count": 4}]"#).unwrap();

    groupexec_cmd()
        .arg("validate")
        .arg(&plan_file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Tasks: 4"));
}

#[test]
fn test_validate_rejects_negative_delay() {
    let temp_dir = TempDir::new().unwrap();
    let plan_file = temp_dir.path().join("plan.yaml");
    fs::write(&plan_file, "- group_name: A\n  delay_seconds: -2\n").unwrap();

    groupexec_cmd()
        .arg("validate")
        .arg(&plan_file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("GEX-010"))
        .stderr(predicate::str::contains("Fix:"));
}

#[test]
fn test_validate_missing_file() {
    groupexec_cmd()
        .args(["validate", "does-not-exist.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load plan"))
        .stderr(predicate::str::contains("Check file path"));
}

// ============================================================================
// Groups
// ============================================================================

#[test]
fn test_groups_lists_resolved_outputs() {
    let temp_dir = TempDir::new().unwrap();
    let workflow = temp_dir.path().join("workflow.json");
    let catalog = temp_dir.path().join("object_info.json");
    fs::write(
        &workflow,
        r#"{
            "nodes": [
                {"id": 10, "type": "SaveImage", "pos": [20, 50], "size": [100, 60], "mode": 0},
                {"id": 11, "type": "KSampler", "pos": [150, 50], "size": [100, 60], "mode": 0}
            ],
            "groups": [
                {"title": "Render", "bounding": [0, 0, 500, 200]},
                {"title": "Empty", "bounding": [5000, 5000, 10, 10]}
            ]
        }"#,
    )
    .unwrap();
    fs::write(&catalog, r#"{"SaveImage": {"output_node": true}, "KSampler": {}}"#).unwrap();

    groupexec_cmd()
        .arg("groups")
        .arg("--workflow")
        .arg(&workflow)
        .arg("--catalog")
        .arg(&catalog)
        .assert()
        .success()
        .stdout(predicate::str::contains("Render"))
        .stdout(predicate::str::contains("10"))
        .stdout(predicate::str::contains("(no output nodes)"));
}

// ============================================================================
// Argument errors
// ============================================================================

#[test]
fn test_run_requires_plan_or_groups() {
    groupexec_cmd()
        .args(["run", "--workflow", "w.json", "--prompt", "p.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Provide a plan file or --groups"));
}

#[test]
fn test_invalid_server_url() {
    groupexec_cmd()
        .args(["--server", "not a url", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid server URL"))
        .stderr(predicate::str::contains("Fix:"));
}

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::tempdir;

fn bundlekit(store: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("bundlekit").unwrap();
    cmd.env("BUNDLEKIT_BUNDLES_ROOT", store)
        .env_remove("BUNDLEKIT_CONFIG")
        .env("XDG_CONFIG_HOME", store.join(".config"))
        .current_dir(store);
    cmd
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("bundlekit").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("install"))
        .stdout(predicate::str::contains("deploy"));
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("bundlekit").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_list_empty_store() {
    let dir = tempdir().unwrap();
    bundlekit(dir.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No bundles installed"));
}

#[test]
fn test_show_missing_bundle_reports_robot_error() {
    let dir = tempdir().unwrap();
    let output = bundlekit(dir.path())
        .args(["--robot", "show", "http://example.org/missing"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let json: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["error"], Value::Bool(true));
    assert_eq!(json["category"], "not_found");
}

#[test]
fn test_missing_descriptor_is_a_config_error() {
    let dir = tempdir().unwrap();
    bundlekit(dir.path())
        .args(["install", "nope.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid descriptor"));
}

#[test]
fn test_explicit_missing_config_fails() {
    let dir = tempdir().unwrap();
    bundlekit(dir.path())
        .args(["--config", "absent.toml", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("absent.toml"));
}

#[test]
fn test_deploy_nonexistent_path() {
    let dir = tempdir().unwrap();
    bundlekit(dir.path())
        .args(["deploy", "missing.tar.xz", "--dir", "remote"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("path does not exist"));
}

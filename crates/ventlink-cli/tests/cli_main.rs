//! Basic CLI tests for the ventlink command-line interface.
//!
//! None of these reach a real controller.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn ventlink() -> Command {
    let mut cmd = Command::cargo_bin("ventlink").unwrap();
    cmd.env_remove("VENTLINK_HOST")
        .env_remove("VENTLINK_PORT")
        .env_remove("VENTLINK_UNIT_ID")
        .env_remove("VENTLINK_TIMEOUT_MS");
    cmd
}

/// A local port with nothing listening on it.
fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[test]
fn test_cli_help() {
    ventlink()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("getvar"))
        .stdout(predicate::str::contains("setvar"))
        .stdout(predicate::str::contains("watch"));
}

#[test]
fn test_list_features() {
    ventlink()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("fan_stage"))
        .stdout(predicate::str::contains("v00102"))
        .stdout(predicate::str::contains("temp_outside_air"));
}

#[test]
fn test_list_features_as_json() {
    let output = ventlink().args(["list", "--json"]).output().unwrap();
    assert!(output.status.success());

    let listing: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let fan_stage = listing
        .as_array()
        .unwrap()
        .iter()
        .find(|f| f["name"] == "fan_stage")
        .unwrap();
    assert_eq!(fan_stage["variable"], "v00102");
    assert_eq!(fan_stage["writable"], true);
}

#[test]
fn test_get_without_host_fails() {
    ventlink()
        .args(["get", "fan_stage"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--host"));
}

#[test]
fn test_unknown_feature_fails() {
    ventlink()
        .args(["get", "turbo_mode", "--host", "127.0.0.1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown feature 'turbo_mode'"));
}

#[test]
fn test_set_read_only_feature_fails() {
    ventlink()
        .args(["set", "temp_outside_air", "20", "--host", "127.0.0.1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("read-only"));
}

#[test]
fn test_set_invalid_value_fails() {
    ventlink()
        .args(["set", "fan_stage", "fast", "--host", "127.0.0.1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a valid integer value"));
}

#[test]
fn test_unreachable_controller_fails() {
    let port = closed_port().to_string();
    ventlink()
        .args(["get", "fan_stage", "--host", "127.0.0.1", "--port", &port])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read feature 'fan_stage'"));
}

#[test]
fn test_invalid_config_file_fails() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[device\nhost = ").unwrap();

    ventlink()
        .args(["get", "fan_stage", "--config"])
        .arg(file.path())
        .assert()
        .failure();
}

#[test]
fn test_getvar_unknown_variable_needs_size() {
    ventlink()
        .args(["getvar", "v09999", "--host", "127.0.0.1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("pass its size"));
}

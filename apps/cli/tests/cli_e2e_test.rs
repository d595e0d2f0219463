use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn djtool() -> Command {
    let mut cmd = Command::cargo_bin("djtool").unwrap();
    cmd.env_remove("DJTOOL_CONFIG").env_remove("DJTOOL_ADDRESS");
    cmd
}

#[test]
fn test_version() {
    djtool().arg("--version").assert().success().stdout(predicate::str::contains("djtool 0.1.0"));
}

#[test]
fn test_help() {
    djtool()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("watch"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn test_config_defaults_as_toml() {
    djtool()
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("address = \"127.0.0.1:50051\""))
        .stdout(predicate::str::contains("liveness_window_ms = 3000"))
        .stdout(predicate::str::contains("[session.backoff]"));
}

#[test]
fn test_config_json() {
    let assert = djtool().args(["config", "--json"]).assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    let json: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON");
    assert_eq!(json["server"]["heartbeat_interval_ms"], 1000);
    assert_eq!(json["session"]["max_retries"], 5);
    assert_eq!(json["session"]["backoff"]["base_ms"], 250);
}

#[test]
fn test_config_file_flag() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("djtool.toml");
    std::fs::write(&path, "[server]\nheartbeat_interval_ms = 500\n").unwrap();

    djtool()
        .arg("--config")
        .arg(&path)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("heartbeat_interval_ms = 500"));
}

#[test]
fn test_config_env_variables() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("djtool.toml");
    std::fs::write(&path, "[session]\nmax_retries = 2\n").unwrap();

    djtool()
        .env("DJTOOL_CONFIG", &path)
        .env("DJTOOL_ADDRESS", "127.0.0.1:6001")
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("max_retries = 2"))
        .stdout(predicate::str::contains("127.0.0.1:6001"));
}

#[test]
fn test_invalid_config_file_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("djtool.toml");
    std::fs::write(&path, "[session]\nliveness_window_ms = 0\n").unwrap();

    djtool()
        .arg("--config")
        .arg(&path)
        .arg("config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("liveness_window_ms"));
}

#[test]
fn test_serve_rejects_bad_address() {
    djtool()
        .args(["serve", "--address", "not-an-address"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_watch_rejects_bad_url() {
    djtool()
        .args(["watch", "localhost:50051"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid endpoint"));
}

#[test]
fn test_watch_rejects_malformed_option() {
    djtool()
        .args(["watch", "http://127.0.0.1:1", "--option", "novalue"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected key=value"));
}

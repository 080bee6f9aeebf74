#![allow(deprecated)]

//! End-to-end tests for the `roomkey` binary
//!
//! Each test points the binary at a config file in a temp directory so that
//! the session file never touches the user's data directory.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;

/// Config file whose session lives next to it.
fn isolated_config(extra: &str) -> (TempDir, PathBuf) {
    let (dir, config_path) = common::temp_config_file("");
    let session_path = dir.path().join("session.json");
    let contents = format!(
        "session:\n  backend: file\n  path: {}\n{}",
        session_path.display(),
        extra
    );
    std::fs::write(&config_path, contents).expect("failed to write config file");
    (dir, config_path)
}

fn roomkey(config_path: &Path) -> Command {
    let mut cmd = Command::cargo_bin("roomkey").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("ROOMKEY_BASE_URL")
        .env_remove("ROOMKEY_SESSION_BACKEND")
        .env_remove("ROOMKEY_SESSION_PATH")
        .env_remove("ROOMKEY_PASSWORD")
        .env_remove("ROOMKEY_TIMEOUT_SECONDS")
        .arg("--config")
        .arg(config_path);
    cmd
}

#[test]
fn test_help_lists_commands() {
    let mut cmd = Command::cargo_bin("roomkey").unwrap();
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("login"))
        .stdout(predicate::str::contains("whoami"))
        .stdout(predicate::str::contains("request"));
}

#[test]
fn test_whoami_without_session() {
    let (_dir, config_path) = isolated_config("");

    roomkey(&config_path)
        .arg("whoami")
        .assert()
        .success()
        .stdout(predicate::str::contains("Not logged in"));
}

#[test]
fn test_whoami_json_without_session() {
    let (_dir, config_path) = isolated_config("");

    roomkey(&config_path)
        .args(["whoami", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"authenticated\": false"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (_dir, config_path) = isolated_config("api:\n  timeout_seconds: 0\n");

    roomkey(&config_path)
        .arg("whoami")
        .assert()
        .failure()
        .stderr(predicate::str::contains("must be greater than 0"));
}

#[test]
fn test_config_load_warnings_reach_stderr() {
    let dir = tempfile::tempdir().expect("failed to create tempdir");
    let missing = dir.path().join("missing.yaml");

    roomkey(&missing)
        .env("ROOMKEY_SESSION_BACKEND", "memory")
        .env("ROOMKEY_TIMEOUT_SECONDS", "soon")
        .arg("whoami")
        .assert()
        .success()
        .stderr(predicate::str::contains("Config file not found"))
        .stderr(predicate::str::contains("Invalid ROOMKEY_TIMEOUT_SECONDS"));
}

#[test]
fn test_login_requires_password() {
    let (_dir, config_path) = isolated_config("");

    roomkey(&config_path)
        .args(["login", "-u", "alice"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--password"));
}

/// Login, then a request whose stored access token has expired: the binary
/// refreshes, retries, prints the body, and persists the new token.
#[tokio::test]
async fn test_login_then_request_refreshes_expired_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "A1",
            "refresh_token": "R1",
            "user": {"id": 42, "username": "alice", "role": "customer"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/rooms"))
        .and(header("Authorization", "Bearer A2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{"number": "101"}])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/rooms"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .and(header("Authorization", "Bearer R1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "A2"})))
        .expect(1)
        .mount(&server)
        .await;

    let (dir, config_path) = isolated_config("");
    let base_url = format!("{}/api", server.uri());

    let login = {
        let mut cmd = roomkey(&config_path);
        cmd.args(["--base-url", &base_url, "login", "-u", "alice", "-p", "s3cret"]);
        tokio::task::spawn_blocking(move || cmd.assert().success().get_output().stdout.clone())
    };
    let stdout = String::from_utf8(login.await.expect("join")).expect("utf8");
    assert!(stdout.contains("Logged in as alice"), "stdout: {stdout}");

    let request = {
        let mut cmd = roomkey(&config_path);
        cmd.args(["--base-url", &base_url, "request", "GET", "/rooms"]);
        tokio::task::spawn_blocking(move || cmd.assert().success().get_output().stdout.clone())
    };
    let stdout = String::from_utf8(request.await.expect("join")).expect("utf8");
    assert!(stdout.contains("\"number\": \"101\""), "stdout: {stdout}");

    let persisted = std::fs::read_to_string(dir.path().join("session.json")).expect("session file");
    let records: serde_json::Value = serde_json::from_str(&persisted).expect("json");
    assert_eq!(records["token"], "A2");
    assert_eq!(records["refresh_token"], "R1");
}

//! End-to-end tests of the `devbox-ctl` binary.
//!
//! Only paths that never reach the container runtime or the vault are
//! exercised here, so the tests run on hosts without either.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::Path;
use std::process::{Command, Output};

const SEEDED_REGISTRY: &str = r#"{
  "schemaVersion": 1,
  "containers": [
    {
      "name": "demo-env",
      "owner": "bob",
      "state": "stopped",
      "createdAt": "2026-01-05T10:00:00Z",
      "lastActivityAt": "2026-01-06T08:30:00Z",
      "cpuLimit": 2,
      "memoryLimit": "4G",
      "volumeName": "demo-env-data",
      "networkHostname": "demo-env",
      "networkAddress": null,
      "withSyncFeature": false
    }
  ]
}
"#;

fn devbox(data_dir: &Path, user: &str, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_devbox-ctl"))
        .env_clear()
        .env("PATH", std::env::var_os("PATH").unwrap_or_default())
        .env("USER", user)
        .arg("--data-dir")
        .arg(data_dir)
        .args(args)
        .output()
        .expect("spawn devbox-ctl")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

fn seeded() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("containers.json"), SEEDED_REGISTRY).expect("seed");
    dir
}

// ── Listing ──────────────────────────────────────────────────────────

#[test]
fn empty_registry_lists_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = devbox(dir.path(), "alice", &["list"]);
    assert!(out.status.success(), "{}", stderr(&out));
    assert_eq!(stdout(&out).trim(), "No containers found.");
    assert!(dir.path().join("containers.json").exists());
}

#[test]
fn json_listing_is_scoped_to_the_caller() {
    let dir = seeded();
    let alice = devbox(dir.path(), "alice", &["list", "--json"]);
    assert!(alice.status.success());
    assert_eq!(stdout(&alice).trim(), "[]");

    let bob = devbox(dir.path(), "bob", &["list", "--json"]);
    let records: serde_json::Value = serde_json::from_slice(&bob.stdout).expect("json");
    assert_eq!(records[0]["name"], "demo-env");
    assert_eq!(records[0]["volumeName"], "demo-env-data");
}

#[test]
fn table_listing_filters_by_state() {
    let dir = seeded();
    let stopped = devbox(dir.path(), "bob", &["list", "--state", "stopped"]);
    assert!(stdout(&stopped).contains("demo-env"));

    let running = devbox(dir.path(), "bob", &["list", "--state", "running"]);
    assert_eq!(stdout(&running).trim(), "No containers found.");
}

// ── Errors ───────────────────────────────────────────────────────────

#[test]
fn invalid_name_fails_with_structured_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = devbox(dir.path(), "alice", &["create", "ab"]);
    assert_eq!(out.status.code(), Some(1));
    let err = stderr(&out);
    assert!(err.contains("Error: invalid container name 'ab': must be at least 3 characters"));
    assert!(err.contains("Example: devbox-ctl create my-project"));
}

#[test]
fn unknown_container_is_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = devbox(dir.path(), "alice", &["status", "ghost"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("Error: container not found: ghost"));
}

#[test]
fn other_users_containers_are_off_limits() {
    let dir = seeded();
    let out = devbox(dir.path(), "alice", &["status", "demo-env"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("belongs to user 'bob'"));
}

#[test]
fn corrupt_registry_is_reported_and_preserved() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("containers.json");
    std::fs::write(&path, "{ truncated").expect("write");

    let out = devbox(dir.path(), "alice", &["list"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("is corrupt"));
    assert_eq!(std::fs::read_to_string(&path).expect("read"), "{ truncated");
}

#[test]
fn malformed_environment_is_a_configuration_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = Command::new(env!("CARGO_BIN_EXE_devbox-ctl"))
        .env_clear()
        .env("USER", "alice")
        .env("DEVBOX_MAX_PER_USER", "lots")
        .arg("--data-dir")
        .arg(dir.path())
        .arg("list")
        .output()
        .expect("spawn");
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("invalid configuration"));
}

// ── Owner operations ─────────────────────────────────────────────────

#[test]
fn owner_sees_status_and_noop_stop() {
    let dir = seeded();
    let status = devbox(dir.path(), "bob", &["status", "demo-env"]);
    assert!(status.status.success(), "{}", stderr(&status));
    let text = stdout(&status);
    assert!(text.contains("State:     stopped"));
    assert!(text.contains("Volume:  demo-env-data"));
    assert!(text.contains("Created:   2026-01-05T10:00:00Z"));

    let stop = devbox(dir.path(), "bob", &["stop", "demo-env"]);
    assert!(stop.status.success());
    assert!(stdout(&stop).contains("already stopped"));
}

#[test]
fn help_lists_every_command() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = devbox(dir.path(), "alice", &["--help"]);
    let text = stdout(&out);
    for command in [
        "create", "list", "start", "stop", "destroy", "status", "logs", "rotate-secret",
    ] {
        assert!(text.contains(command), "missing {command}");
    }
}

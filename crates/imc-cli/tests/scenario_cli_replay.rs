//! Scenario: `imc replay` from the command line (built with `--features testkit`)
//!
//! # Invariants under test
//! - Replay prints one JSON object per line, updates in sequence order.
//! - A permanent failure shows up as exactly one error callback line.
//! - Bad inputs fail with a non-zero exit and a message naming the problem.

use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;

fn testdata(name: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("testdata")
        .join(name)
        .to_string_lossy()
        .to_string()
}

fn imc() -> Command {
    let mut cmd = Command::cargo_bin("imc").unwrap();
    cmd.env("RUST_LOG", "warn");
    cmd
}

#[test]
fn replay_prints_updates_in_order() {
    let out = imc()
        .args(["replay", "--session", &testdata("session_bootstrap.json")])
        .args(["--config", &testdata("client.yaml")])
        .output()
        .unwrap();
    assert!(out.status.success());

    let stdout = String::from_utf8(out.stdout).unwrap();
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    let seqs: Vec<u64> = lines
        .iter()
        .filter(|l| l["kind"] == "callback")
        .filter(|l| l["event"]["event"] == "full_update" || l["event"]["event"] == "incremental_update")
        .map(|l| l["event"]["seq"].as_u64().unwrap())
        .collect();
    assert_eq!(seqs, vec![1, 3, 4, 5]);

    let errors = lines
        .iter()
        .filter(|l| l["kind"] == "callback" && l["event"]["event"] == "error")
        .count();
    assert_eq!(errors, 1);

    let last = lines.last().unwrap();
    assert_eq!(last["kind"], "advance");
    assert_eq!(last["state"], "transform_error");
}

#[test]
fn target_override_is_applied() {
    imc()
        .args(["replay", "--session", &testdata("session_bootstrap.json")])
        .args(["--target", "base"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"kind\":\"advance\""));
}

#[test]
fn missing_session_fails() {
    imc()
        .args(["replay", "--session", "does/not/exist.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("read session"));
}

#[test]
fn invalid_config_fails_before_replay() {
    let dir = tempfile::tempdir().unwrap();
    let bad = dir.path().join("bad.yaml");
    std::fs::write(&bad, "target_frame: map\nkeep_alive_secs: 0\n").unwrap();

    imc()
        .args(["replay", "--session", &testdata("session_bootstrap.json")])
        .args(["--config", bad.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_INVALID"));
}

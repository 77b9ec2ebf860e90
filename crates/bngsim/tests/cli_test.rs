//! Integration tests for the `bngsim` CLI binary.
//!
//! These exercise argument parsing, config layering, exit codes and the
//! offline `dump` command. None of them open a listening socket.
#![allow(clippy::unwrap_used)]

use std::io::Write;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `bngsim` binary with env isolation.
///
/// Clears the `BNGSIM_*` variables this suite relies on and points config
/// directories at a nonexistent path so tests never read a real config.
fn bngsim_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("bngsim");
    cmd.env("HOME", "/tmp/bngsim-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/bngsim-cli-test-nonexistent")
        .env_remove("BNGSIM_CONFIG")
        .env_remove("BNGSIM_SIMULATION__SUBSCRIBERS")
        .env_remove("BNGSIM_SIMULATION__ACTIVATION_PROBABILITY")
        .env_remove("BNGSIM_SERVER__PORT")
        .env_remove("BNGSIM_LOG__JSON")
        .env_remove("RUST_LOG");
    cmd
}

fn stdout_lines(output: &std::process::Output) -> Vec<String> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_owned)
        .collect()
}

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_help_flag() {
    bngsim_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("broadband network gateway")
            .and(predicate::str::contains("serve"))
            .and(predicate::str::contains("dump"))
            .and(predicate::str::contains("completions")),
    );
}

#[test]
fn test_version_flag() {
    bngsim_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("bngsim"));
}

#[test]
fn test_unknown_flag_is_usage_error() {
    bngsim_cmd()
        .args(["dump", "--no-such-flag"])
        .assert()
        .code(2);
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    bngsim_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("bngsim"));
}

#[test]
fn test_completions_zsh() {
    bngsim_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

// ── Dump ────────────────────────────────────────────────────────────

#[test]
fn test_dump_plain_lists_every_subscriber() {
    let output = bngsim_cmd()
        .args(["dump", "-n", "3", "--output", "plain"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_lines(&output), ["1", "2", "3"]);
}

#[test]
fn test_dump_json_after_ticks() {
    let output = bngsim_cmd()
        .args(["dump", "-n", "5", "--ticks", "2", "--output", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let doc: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(doc["generation"], 3);
    let subscribers = doc["subscribers"].as_array().unwrap();
    assert_eq!(subscribers.len(), 5);
    assert_eq!(subscribers[0]["id"], 1);
    let state = subscribers[0]["state"].as_str().unwrap();
    assert!(state == "ACTIVE" || state == "INACTIVE", "state: {state}");
}

#[test]
fn test_dump_table_is_uncolored_when_piped() {
    bngsim_cmd()
        .args(["dump", "-n", "2"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("MAC")
                .and(predicate::str::contains("2 subscribers"))
                .and(predicate::str::contains("\u{1b}[").not()),
        );
}

// ── Config layering ─────────────────────────────────────────────────

#[test]
fn test_config_file_sets_population() {
    let file = write_config("[simulation]\nsubscribers = 2\n");
    let output = bngsim_cmd()
        .arg("--config")
        .arg(file.path())
        .args(["dump", "--output", "plain"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_lines(&output), ["1", "2"]);
}

#[test]
fn test_env_overrides_config_file() {
    let file = write_config("[simulation]\nsubscribers = 2\n");
    let output = bngsim_cmd()
        .env("BNGSIM_SIMULATION__SUBSCRIBERS", "4")
        .arg("--config")
        .arg(file.path())
        .args(["dump", "--output", "plain"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_lines(&output).len(), 4);
}

#[test]
fn test_flag_overrides_env() {
    let output = bngsim_cmd()
        .env("BNGSIM_SIMULATION__SUBSCRIBERS", "4")
        .args(["dump", "-n", "1", "--output", "plain"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_lines(&output), ["1"]);
}

// ── Exit codes ──────────────────────────────────────────────────────

#[test]
fn test_invalid_probability_exits_2() {
    bngsim_cmd()
        .args(["dump", "--activation-probability", "1.5"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("activation_probability"));
}

#[test]
fn test_zero_subscribers_exits_2() {
    bngsim_cmd()
        .args(["dump", "-n", "0"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("subscriber_count"));
}

#[test]
fn test_missing_config_exits_3() {
    bngsim_cmd()
        .args(["--config", "/tmp/bngsim-cli-test-nonexistent/nope.toml", "dump"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_malformed_config_exits_3() {
    let file = write_config("[simulation]\nsubscribers = \"lots\"\n");
    bngsim_cmd()
        .arg("--config")
        .arg(file.path())
        .arg("dump")
        .assert()
        .code(3);
}

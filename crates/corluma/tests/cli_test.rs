//! Integration tests for the `corluma` CLI binary.
//!
//! Every test points the config file and data directory into a fresh
//! temporary directory, so nothing touches the user's real setup.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{Value, json};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `corluma` binary isolated under `dir`.
fn corluma_cmd(dir: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("corluma");
    cmd.env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir.join("xdg"))
        .env("CORLUMA_CONFIG", dir.join("config.toml"))
        .env("CORLUMA_DATA_DIR", dir.join("data"))
        .env_remove("CORLUMA_OUTPUT")
        .env_remove("RUST_LOG");
    cmd
}

fn seed_nanoleaf(dir: &Path) {
    let data = dir.join("data");
    std::fs::create_dir_all(&data).unwrap();
    let saved = json!([
        {
            "name": "Office",
            "IP": "10.0.0.3",
            "port": 16021,
            "serial": "S16332A3407",
            "auth": "tok",
            "hardwareName": "Light Panels 55:4f:cc"
        },
        {
            "name": "Hallway",
            "IP": "10.0.0.4",
            "port": 16021,
            "serial": "S19124C8036",
            "auth": "tok2",
            "hardwareName": "Canvas 12:ab:34"
        }
    ]);
    std::fs::write(data.join("nanoleaf.json"), saved.to_string()).unwrap();
}

fn read_saved(dir: &Path, name: &str) -> Value {
    serde_json::from_str(&std::fs::read_to_string(dir.join("data").join(name)).unwrap()).unwrap()
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let dir = tempfile::tempdir().unwrap();
    let output = corluma_cmd(dir.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_lists_commands() {
    let dir = tempfile::tempdir().unwrap();
    corluma_cmd(dir.path()).arg("--help").assert().success().stdout(
        predicate::str::contains("discover")
            .and(predicate::str::contains("devices"))
            .and(predicate::str::contains("config")),
    );
}

#[test]
fn test_completions_zsh() {
    let dir = tempfile::tempdir().unwrap();
    corluma_cmd(dir.path())
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_honors_env_override() {
    let dir = tempfile::tempdir().unwrap();
    corluma_cmd(dir.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_init_refuses_to_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    corluma_cmd(dir.path()).args(["config", "init"]).assert().success();
    let written = std::fs::read_to_string(dir.path().join("config.toml")).unwrap();
    assert!(written.contains("[discovery]"));

    corluma_cmd(dir.path())
        .args(["config", "init"])
        .assert()
        .code(6)
        .stderr(predicate::str::contains("already exists"));

    corluma_cmd(dir.path())
        .args(["config", "init", "--force"])
        .assert()
        .success();
}

#[test]
fn test_config_show_json_reflects_file_and_env() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("config.toml"),
        "[discovery]\ntick_ms = 1000\n\n[hue]\nenabled = false\n",
    )
    .unwrap();

    let output = corluma_cmd(dir.path())
        .env("CORLUMA_DISCOVERY__GRACE_SECS", "30")
        .args(["-o", "json", "config", "show"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let cfg = stdout_json(&output);
    assert_eq!(cfg["discovery"]["tick_ms"], 1000);
    assert_eq!(cfg["discovery"]["grace_secs"], 30);
    assert_eq!(cfg["hue"]["enabled"], false);
    assert_eq!(cfg["nanoleaf"]["enabled"], true);
}

#[test]
fn test_invalid_config_value_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("config.toml"), "[nanoleaf]\ntick_ms = 0\n").unwrap();
    corluma_cmd(dir.path())
        .args(["devices", "list", "--family", "nanoleaf"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("tick_ms"));
}

// ── Devices ─────────────────────────────────────────────────────────

#[test]
fn test_devices_list_empty() {
    let dir = tempfile::tempdir().unwrap();
    let output = corluma_cmd(dir.path())
        .args(["-o", "json", "devices", "list"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output), json!([]));
}

#[test]
fn test_devices_list_shows_saved_devices() {
    let dir = tempfile::tempdir().unwrap();
    seed_nanoleaf(dir.path());

    let output = corluma_cmd(dir.path())
        .args(["-o", "json", "devices", "list", "--family", "nanoleaf"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let listed = stdout_json(&output);
    assert_eq!(listed.as_array().unwrap().len(), 2);
    assert_eq!(listed[0]["serial"], "S16332A3407");
    assert_eq!(listed[0]["display_name"], "Office");
    assert!(listed[0].get("auth_token").is_none());

    corluma_cmd(dir.path())
        .args(["-o", "plain", "devices", "list"])
        .assert()
        .success()
        .stdout("S16332A3407\nS19124C8036\n");
}

#[test]
fn test_devices_get_shows_detail() {
    let dir = tempfile::tempdir().unwrap();
    seed_nanoleaf(dir.path());
    corluma_cmd(dir.path())
        .args(["devices", "get", "nanoleaf", "10.0.0.4"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Hallway").and(predicate::str::contains("Canvas 12:ab:34")),
        );
}

#[test]
fn test_devices_remove_updates_saved_file() {
    let dir = tempfile::tempdir().unwrap();
    seed_nanoleaf(dir.path());

    corluma_cmd(dir.path())
        .args(["devices", "remove", "nanoleaf", "s16332a3407", "--yes"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Removed Office"));

    let saved = read_saved(dir.path(), "nanoleaf.json");
    assert_eq!(saved.as_array().unwrap().len(), 1);
    assert_eq!(saved[0]["serial"], "S19124C8036");
}

#[test]
fn test_devices_remove_requires_confirmation() {
    let dir = tempfile::tempdir().unwrap();
    seed_nanoleaf(dir.path());
    corluma_cmd(dir.path())
        .args(["devices", "remove", "nanoleaf", "10.0.0.3"])
        .write_stdin("")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--yes"));
    assert_eq!(
        read_saved(dir.path(), "nanoleaf.json").as_array().unwrap().len(),
        2
    );
}

#[test]
fn test_devices_remove_unknown_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    seed_nanoleaf(dir.path());
    corluma_cmd(dir.path())
        .args(["devices", "remove", "nanoleaf", "10.9.9.9", "--yes"])
        .assert()
        .code(4);
}

#[test]
fn test_devices_rename_persists() {
    let dir = tempfile::tempdir().unwrap();
    seed_nanoleaf(dir.path());
    corluma_cmd(dir.path())
        .args(["devices", "rename", "nanoleaf", "S19124C8036", "Stairs"])
        .assert()
        .success();

    let saved = read_saved(dir.path(), "nanoleaf.json");
    assert_eq!(saved[1]["name"], "Stairs");
    assert_eq!(saved[1]["auth"], "tok2");
}

// ── Discover ────────────────────────────────────────────────────────

#[test]
fn test_discover_manual_ip_needs_a_family() {
    let dir = tempfile::tempdir().unwrap();
    corluma_cmd(dir.path())
        .args(["discover", "--ip", "10.0.0.3", "--duration", "1"])
        .assert()
        .code(2);
}

#[test]
fn test_discover_tracks_manual_address() {
    let dir = tempfile::tempdir().unwrap();
    let output = corluma_cmd(dir.path())
        .env("CORLUMA_DISCOVERY__TICK_MS", "100")
        .args([
            "-o",
            "json",
            "discover",
            "--nanoleaf",
            "--no-broadcast",
            "--ip",
            "127.0.0.1:9",
            "--duration",
            "1",
        ])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );

    let listed = stdout_json(&output);
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["status"], "not_found");
    assert_eq!(listed[0]["ip"], "127.0.0.1");
    assert_eq!(listed[0]["port"], 9);
    assert!(String::from_utf8_lossy(&output.stderr).contains("looking_for_previous"));

    let saved = read_saved(dir.path(), "nanoleaf.json");
    assert_eq!(saved[0]["IP"], "127.0.0.1");
}

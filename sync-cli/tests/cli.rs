//! Command-line surface checks against the built binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn tablesync() -> Command {
    Command::cargo_bin("tablesync").unwrap()
}

#[test]
fn help_lists_commands() {
    tablesync()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("host"))
        .stdout(predicate::str::contains("join"))
        .stdout(predicate::str::contains("resume"));
}

#[test]
fn init_then_sessions() {
    let dir = tempdir().unwrap();
    tablesync()
        .args(["--data-dir"])
        .arg(dir.path())
        .args(["init", "--name", "Ada"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Device initialized"));

    assert!(dir.path().join("device.json").exists());

    tablesync()
        .args(["--data-dir"])
        .arg(dir.path())
        .arg("init")
        .args(["--name", "Again"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already initialized"));

    tablesync()
        .args(["--data-dir"])
        .arg(dir.path())
        .arg("sessions")
        .assert()
        .success()
        .stdout(predicate::str::contains("No saved sessions"));
}

#[test]
fn join_requires_init() {
    let dir = tempdir().unwrap();
    tablesync()
        .args(["--data-dir"])
        .arg(dir.path())
        .args(["join", "ABC234"])
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("tablesync init"));
}

#[test]
fn info_rejects_bad_code() {
    tablesync()
        .args(["--relay", "http://127.0.0.1:1", "info", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid lobby code"));
}

//! CLI argument parsing tests for the bridge command.

use assert_cmd::Command;
use predicates::prelude::*;

fn bridge_cmd() -> Command {
    Command::new(env!("CARGO_BIN_EXE_bridge"))
}

#[test]
fn test_help() {
    bridge_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Bridge FDB management utility"));
}

#[test]
fn test_invalid_subcommand() {
    bridge_cmd()
        .arg("nonsense")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_fdb_add_requires_dev() {
    bridge_cmd()
        .args(["fdb", "add", "de:ad:be:ef:00:01"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--dev"));
}

#[test]
fn test_fdb_show_aliases() {
    bridge_cmd().args(["fdb", "show", "--help"]).assert().success();
    bridge_cmd().args(["fdb", "list", "--help"]).assert().success();
}

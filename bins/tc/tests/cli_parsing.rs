//! CLI argument parsing tests for the tc command.
//!
//! These tests verify that command-line arguments are correctly parsed
//! without requiring network access or root privileges.

use assert_cmd::Command;
use predicates::prelude::*;

fn tc_cmd() -> Command {
    Command::new(env!("CARGO_BIN_EXE_tc"))
}

#[test]
fn test_help() {
    tc_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Traffic control filter tool"));
}

#[test]
fn test_version() {
    tc_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("tc"));
}

#[test]
fn test_invalid_subcommand() {
    tc_cmd()
        .arg("frobnicate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_filter_help() {
    tc_cmd()
        .args(["filter", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("add"))
        .stdout(predicate::str::contains("show"));
}

#[test]
fn test_filter_add_requires_kind() {
    tc_cmd().args(["filter", "add", "eth0"]).assert().failure();
}

#[test]
fn test_global_flags() {
    tc_cmd().args(["-j", "--help"]).assert().success();
    tc_cmd().args(["--json", "--help"]).assert().success();
    tc_cmd().args(["-p", "--help"]).assert().success();
    tc_cmd().args(["-s", "--help"]).assert().success();
}

//! Integration tests for the stagectl binary
//!
//! These tests run the compiled binary without hardware: help output, configuration
//! errors and unknown resources.
//!
//! Run with: cargo test -p stage-cli --test cli_tests

use std::process::Command;

fn stagectl() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_stagectl"));
    command.env_remove("STAGECTL_FAMILY").env_remove("STAGECTL_RESOURCE");
    command
}

#[test]
fn test_help_lists_subcommands() {
    let output = stagectl()
        .arg("--help")
        .output()
        .expect("Failed to execute stagectl");

    assert!(output.status.success(), "Help command should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    for subcommand in ["move", "move-rel", "home", "stop", "speed", "position", "status", "check"] {
        assert!(stdout.contains(subcommand), "missing '{subcommand}' in:\n{stdout}");
    }
}

#[test]
fn test_missing_configuration_fails() {
    let output = stagectl()
        .args(["home", "--axis", "X"])
        .output()
        .expect("Failed to execute stagectl");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid stagectl configuration"), "{stderr}");
}

#[test]
fn test_unknown_family_is_rejected_by_the_parser() {
    let output = stagectl()
        .args(["--family", "shot702", "--resource", "COM1", "home"])
        .output()
        .expect("Failed to execute stagectl");

    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_non_serial_resource_is_refused() {
    let output = stagectl()
        .args(["--family", "sbis26", "--resource", "GPIB0::5::INSTR", "position"])
        .output()
        .expect("Failed to execute stagectl");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to connect to SBIS26 on GPIB0::5::INSTR"), "{stderr}");
}

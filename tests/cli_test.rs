//! Tests for the `omake` binary.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const DESCRIPTION: &str = r#"
platforms = ["LINUX"]

[aliases]
linux = "LINUX"

[constants]
GREETING = "hello"

[[target.all.step]]
file = "force_create"
path = "greeting.txt"
body = "${GREETING}"
"#;

fn omake(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_omake"))
        .args(args)
        .current_dir(dir)
        .env_remove("OMAKE_PLATFORM")
        .env_remove("OMAKE_LOG")
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to execute omake")
}

fn project() -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    fs::write(dir.path().join("omake.toml"), DESCRIPTION).expect("Failed to write omake.toml");
    dir
}

#[test]
fn test_build_writes_outputs_cache_and_log() {
    let dir = project();
    let output = omake(dir.path(), &["build", "-p", "linux"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stdout));

    assert_eq!(fs::read_to_string(dir.path().join("greeting.txt")).unwrap(), "hello");
    assert!(dir.path().join("omake.toml.cache").exists());
    assert!(dir.path().join("omake.log").exists());
}

#[test]
fn test_build_is_the_default_command() {
    let dir = project();
    let output = Command::new(env!("CARGO_BIN_EXE_omake"))
        .args(["--no-log", "all"])
        .current_dir(dir.path())
        .env("OMAKE_PLATFORM", "LINUX")
        .output()
        .expect("Failed to execute omake");
    assert!(output.status.success());
    assert!(dir.path().join("greeting.txt").exists());
    assert!(!dir.path().join("omake.log").exists());
}

#[test]
fn test_missing_platform_is_rejected() {
    let dir = project();
    let output = omake(dir.path(), &["build"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(!dir.path().join("greeting.txt").exists());
}

#[test]
fn test_failed_build_exits_non_zero() {
    let dir = project();
    fs::write(dir.path().join("greeting.txt"), "").unwrap();
    fs::write(
        dir.path().join("omake.toml"),
        DESCRIPTION.replace("force_create", "create"),
    )
    .unwrap();

    let output = omake(dir.path(), &["build", "-p", "LINUX", "--no-log"]);
    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Build failed"), "{}", stdout);
}

#[test]
fn test_cache_subcommands() {
    let dir = project();
    assert!(omake(dir.path(), &["build", "-p", "LINUX", "--no-log"]).status.success());

    let path = omake(dir.path(), &["cache", "path"]);
    assert!(String::from_utf8_lossy(&path.stdout).trim().ends_with("omake.toml.cache"));

    let list = omake(dir.path(), &["cache", "list"]);
    assert!(list.status.success());
    assert!(String::from_utf8_lossy(&list.stdout).contains("omake.document.sha256"));

    let clean = omake(dir.path(), &["cache", "clean"]);
    assert!(clean.status.success());
    assert!(!dir.path().join("omake.toml.cache").exists());
}

#[test]
fn test_dry_run_prints_statements() {
    let dir = project();
    let output = omake(dir.path(), &["build", "-p", "LINUX", "--dry-run", "--no-log"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("greeting.txt"));
    assert!(!dir.path().join("greeting.txt").exists());
}

#[test]
fn test_completions() {
    let dir = TempDir::new().unwrap();
    let output = omake(dir.path(), &["completions", "bash"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("omake"));
}

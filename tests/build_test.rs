//! End-to-end builds through the library API.
//!
//! Each test writes an `omake.toml` into a scratch directory and runs
//! `Engine::build` against it.

use omake::engine::{BuildSummary, Engine, EngineOptions, cache_path};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn project(description: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let file = dir.path().join("omake.toml");
    fs::write(&file, description).expect("Failed to write omake.toml");
    (dir, file)
}

fn options(file: &Path, targets: &[&str]) -> EngineOptions {
    let mut options = EngineOptions::new(file, "LINUX");
    options.targets = targets.iter().map(|t| t.to_string()).collect();
    options.progress = false;
    options.quiet = true;
    options
}

fn build(file: &Path, targets: &[&str]) -> BuildSummary {
    Engine::new()
        .build(&options(file, targets))
        .expect("build could not start")
}

#[test]
fn test_try_copy_tolerates_existing_destination() {
    let (dir, file) = project(
        r#"
platforms = ["LINUX"]

[[target.all.step]]
file = "try_copy"
path = "a.txt"
arg = "b.txt"
"#,
    );
    fs::write(dir.path().join("a.txt"), "new").unwrap();
    fs::write(dir.path().join("b.txt"), "old").unwrap();

    let summary = build(&file, &[]);
    assert!(summary.success());
    assert_eq!(summary.run.skipped, 1);
    assert_eq!(fs::read_to_string(dir.path().join("b.txt")).unwrap(), "old");
}

#[test]
fn test_plain_copy_conflict_is_an_error() {
    let (dir, file) = project(
        r#"
platforms = ["LINUX"]

[[target.all.step]]
file = "copy"
path = "a.txt"
arg = "b.txt"
"#,
    );
    fs::write(dir.path().join("a.txt"), "new").unwrap();
    fs::write(dir.path().join("b.txt"), "old").unwrap();

    let summary = build(&file, &[]);
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.run.targets_failed, 1);
    assert_eq!(fs::read_to_string(dir.path().join("b.txt")).unwrap(), "old");
}

#[test]
fn test_failed_target_stops_later_targets() {
    let (dir, file) = project(
        r#"
platforms = ["LINUX"]

[[target.a.step]]
file = "create"
path = "exists.txt"

[[target.a.step]]
file = "create"
path = "a_done.txt"

[[target.b.step]]
file = "create"
path = "b_done.txt"
"#,
    );
    fs::write(dir.path().join("exists.txt"), "").unwrap();

    let summary = build(&file, &["a", "b"]);
    assert!(!summary.success());
    assert_eq!(summary.run.targets_abandoned, 1);
    assert!(!dir.path().join("a_done.txt").exists());
    assert!(!dir.path().join("b_done.txt").exists());
}

#[test]
fn test_targets_run_in_requested_order() {
    let (dir, file) = project(
        r#"
platforms = ["LINUX"]

[[target.first.step]]
file = "force_create"
path = "order.txt"
body = "first"

[[target.second.step]]
file = "append"
path = "order.txt"
body = "second"
"#,
    );

    let summary = build(&file, &["first", "second"]);
    assert!(summary.success());
    assert_eq!(summary.run.targets_completed, 2);
    assert_eq!(fs::read_to_string(dir.path().join("order.txt")).unwrap(), "firstsecond");
}

#[test]
fn test_list_expansion_reaches_file_bodies() {
    let (dir, file) = project(
        r#"
platforms = ["LINUX", "WIN32"]

[constants]
OUT = "out"

[sources]
SRC = ["a.c", "sub/b.c", { file = "win.c", platform = "WIN32" }]

[[target.all.step]]
dir = "try_create"
path = "${OUT}"

[[target.all.step]]
file = "force_create"
path = "${OUT}/objects.txt"
body = "${&([SRC].no_extension).o}"
"#,
    );

    let summary = build(&file, &[]);
    assert!(summary.success(), "{:?}", summary);
    assert_eq!(
        fs::read_to_string(dir.path().join("out/objects.txt")).unwrap(),
        "a.o sub/b.o"
    );
}

#[test]
fn test_force_copy_onto_itself_keeps_source() {
    let (dir, file) = project(
        r#"
platforms = ["LINUX"]

[[target.all.step]]
file = "force_copy"
path = "a.txt"
arg = "a.txt"
"#,
    );
    fs::write(dir.path().join("a.txt"), "precious").unwrap();

    let summary = build(&file, &[]);
    assert!(summary.success());
    assert_eq!(summary.run.skipped, 1);
    assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "precious");
}

#[test]
fn test_unknown_platform_fails_without_running() {
    let (dir, file) = project(
        r#"
platforms = ["WIN32"]

[[target.all.step]]
file = "create"
path = "never.txt"
"#,
    );

    let summary = build(&file, &[]);
    assert!(!summary.success());
    assert_eq!(summary.run.targets_completed, 0);
    assert!(!dir.path().join("never.txt").exists());
}

#[test]
fn test_parse_snapshot_reused_until_description_changes() {
    let description = r#"
platforms = ["LINUX"]

[[target.all.step]]
file = "force_create"
path = "v.txt"
body = "one"
"#;
    let (dir, file) = project(description);

    assert!(!build(&file, &[]).from_snapshot);
    assert!(cache_path(&file).exists());

    let second = build(&file, &[]);
    assert!(second.success());
    assert!(second.from_snapshot);

    fs::write(&file, description.replace("one", "two")).unwrap();
    let third = build(&file, &[]);
    assert!(!third.from_snapshot);
    assert_eq!(fs::read_to_string(dir.path().join("v.txt")).unwrap(), "two");
}

#[test]
fn test_snapshot_reuse_can_be_disabled() {
    let (_dir, file) = project("platforms = [\"LINUX\"]\n");
    build(&file, &[]);

    let mut opts = options(&file, &[]);
    opts.reuse_snapshots = false;
    let summary = Engine::new().build(&opts).unwrap();
    assert!(!summary.from_snapshot);
}

#[test]
fn test_corrupt_cache_is_discarded_with_warning() {
    let (_dir, file) = project("platforms = [\"LINUX\"]\n");
    fs::write(cache_path(&file), b"not a cache").unwrap();

    let summary = build(&file, &[]);
    assert!(summary.success());
    assert_eq!(summary.warnings, 1);
}

#[cfg(unix)]
#[test]
fn test_tool_skipped_while_dependencies_unchanged() {
    let (dir, file) = project(
        r#"
platforms = ["LINUX"]

[tools]
sh = "/bin/sh"

[[target.all.step]]
run = "sh -c 'echo built >> runs.log'"
depends = ["a.c"]
"#,
    );
    let source = dir.path().join("a.c");
    fs::write(&source, "int x;").unwrap();
    let runs = || {
        fs::read_to_string(dir.path().join("runs.log"))
            .unwrap_or_default()
            .lines()
            .count()
    };

    assert!(build(&file, &[]).success());
    assert_eq!(runs(), 1);

    let second = build(&file, &[]);
    assert!(second.success());
    assert_eq!(second.run.up_to_date, 1);
    assert_eq!(runs(), 1);

    File::options()
        .write(true)
        .open(&source)
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(60))
        .unwrap();
    assert!(build(&file, &[]).success());
    assert_eq!(runs(), 2);
}

#[cfg(unix)]
#[test]
fn test_failing_tool_does_not_commit_fingerprints() {
    let (dir, file) = project(
        r#"
platforms = ["LINUX"]

[tools]
sh = "/bin/sh"

[[target.all.step]]
run = "sh -c 'echo run >> runs.log; exit 3'"
depends = ["a.c"]
"#,
    );
    fs::write(dir.path().join("a.c"), "").unwrap();

    for expected in 1..=2 {
        let summary = build(&file, &[]);
        assert_eq!(summary.errors, 1);
        let log = fs::read_to_string(dir.path().join("runs.log")).unwrap();
        assert_eq!(log.lines().count(), expected);
    }
}

#[cfg(unix)]
#[test]
fn test_later_failure_in_target_reruns_earlier_tool() {
    let (dir, file) = project(
        r#"
platforms = ["LINUX"]

[tools]
sh = "/bin/sh"

[[target.all.step]]
run = "sh -c 'echo run >> runs.log'"
depends = ["a.c"]

[[target.all.step]]
file = "create"
path = "a.c"
"#,
    );
    fs::write(dir.path().join("a.c"), "").unwrap();

    for expected in 1..=2 {
        let summary = build(&file, &[]);
        assert_eq!(summary.errors, 1);
        let log = fs::read_to_string(dir.path().join("runs.log")).unwrap();
        assert_eq!(log.lines().count(), expected);
    }
}

#[cfg(unix)]
#[test]
fn test_dry_run_leaves_project_untouched() {
    let (dir, file) = project(
        r#"
platforms = ["LINUX"]

[tools]
sh = "/bin/sh"

[[target.all.step]]
run = "sh -c 'echo built >> runs.log'"
depends = ["a.c"]

[[target.all.step]]
file = "create"
path = "out.txt"
"#,
    );
    fs::write(dir.path().join("a.c"), "").unwrap();

    let mut opts = options(&file, &[]);
    opts.dry_run = true;
    let summary = Engine::new().build(&opts).unwrap();
    assert!(summary.success());
    assert_eq!(summary.run.executed, 2);
    assert!(!dir.path().join("runs.log").exists());
    assert!(!dir.path().join("out.txt").exists());

    // Nothing was committed, so a real build still runs the tool.
    assert!(build(&file, &[]).success());
    assert!(dir.path().join("runs.log").exists());
}

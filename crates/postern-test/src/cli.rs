//! CLI regression tests for the `postern` binary.
//!
//! These tests invoke the binary as a subprocess to catch regressions in flag
//! names, exit codes, and output formats.
//!
//! Run with: `cargo test -p postern-test`
//! Requires the `postern` binary to be built first (`cargo build -p postern`).

use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;
use tempfile::TempDir;

use crate::project::fixtures_dir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Returns an assert_cmd Command wrapping the `postern` binary.
fn postern() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("postern")
        .expect("postern binary not found; run `cargo build -p postern` first")
}

fn fixture_config(name: &str) -> PathBuf {
    fixtures_dir().join(name).join("postern.yaml")
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    let s = String::from_utf8(output.stdout.clone()).expect("stdout should be valid UTF-8");
    serde_json::from_str(&s).expect("output should be valid JSON")
}

// ---------------------------------------------------------------------------
// postern validate
// ---------------------------------------------------------------------------

#[test]
fn validate_basic_project_exits_zero() {
    postern()
        .args(["validate", "--config"])
        .arg(fixture_config("basic"))
        .assert()
        .success()
        .stderr(contains("4 route(s)"));
}

#[test]
fn validate_cookie_without_capability_exits_one() {
    postern()
        .args(["validate", "--config"])
        .arg(fixture_config("cookie-without-capability"))
        .assert()
        .failure()
        .code(1)
        .stderr(contains("E2103").and(contains("cookie")));
}

#[test]
fn validate_query_conflict_exits_one() {
    postern()
        .args(["validate", "--config"])
        .arg(fixture_config("query-conflict"))
        .assert()
        .failure()
        .code(1)
        .stderr(contains("E2101"));
}

#[test]
fn validate_missing_config_exits_one() {
    postern()
        .args(["validate", "--config", "this-file-does-not-exist.yaml"])
        .assert()
        .failure()
        .code(1)
        .stderr(contains("config file not found"));
}

#[test]
fn validate_json_format_outputs_valid_json() {
    let output = postern()
        .args(["validate", "--config"])
        .arg(fixture_config("basic"))
        .args(["--format", "json"])
        .assert()
        .success()
        .get_output()
        .clone();

    let v = stdout_json(&output);
    assert_eq!(v["valid"], true);
    assert_eq!(v["summary"]["routes"], 4);
    assert_eq!(v["summary"]["controllers"], 3);
    assert_eq!(v["diagnostics"], serde_json::json!([]));
}

#[test]
fn validate_json_format_invalid_project_exits_one_with_json() {
    let output = postern()
        .args(["validate", "--config"])
        .arg(fixture_config("cookie-without-capability"))
        .args(["--format", "json"])
        .assert()
        .failure()
        .code(1)
        .get_output()
        .clone();

    let v = stdout_json(&output);
    assert_eq!(v["valid"], false);
    assert_eq!(v["summary"]["errors"], 1);
    assert_eq!(v["diagnostics"][0]["code"], "E2103");
    assert_eq!(v["diagnostics"][0]["location"]["parameter"], "cookie");
}

#[test]
fn validate_explicit_controllers() {
    let controller = fixtures_dir().join("query-conflict/src/routes/items.rs");
    postern()
        .args(["validate", "--controllers"])
        .arg(&controller)
        .assert()
        .failure()
        .stderr(contains("E2101"));
}

// ---------------------------------------------------------------------------
// postern compile
// ---------------------------------------------------------------------------

#[test]
fn compile_writes_artifact() {
    let tmp = TempDir::new().unwrap();
    let output = tmp.path().join("app.pta");

    postern()
        .args(["compile", "--config"])
        .arg(fixture_config("basic"))
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stderr(contains("4 routes"));

    assert!(output.exists());
    let manifest = postern_compiler::load_manifest(&output).unwrap();
    assert_eq!(manifest.routes_count, 4);
    assert_eq!(manifest.sources.len(), 3);
}

#[test]
fn compile_is_byte_identical_across_runs() {
    let tmp = TempDir::new().unwrap();
    let first = tmp.path().join("first.pta");
    let second = tmp.path().join("second.pta");

    for output in [&first, &second] {
        postern()
            .args(["compile", "--config"])
            .arg(fixture_config("basic"))
            .arg("--output")
            .arg(output)
            .assert()
            .success();
    }

    assert_eq!(std::fs::read(&first).unwrap(), std::fs::read(&second).unwrap());
}

#[test]
fn compile_with_errors_emits_nothing() {
    let tmp = TempDir::new().unwrap();
    let output = tmp.path().join("app.pta");

    postern()
        .args(["compile", "--config"])
        .arg(fixture_config("cookie-without-capability"))
        .arg("--output")
        .arg(&output)
        .assert()
        .failure()
        .code(1)
        .stderr(contains("E2103").and(contains("artifact not emitted")));

    assert!(!output.exists());
}

#[test]
fn compile_without_output_exits_one() {
    postern()
        .args(["compile", "--config"])
        .arg(fixture_config("basic"))
        .assert()
        .failure()
        .code(1)
        .stderr(contains("no output path"));
}

#[test]
fn compile_uses_config_output() {
    let tmp = TempDir::new().unwrap();
    let routes = tmp.path().join("routes");
    std::fs::create_dir_all(&routes).unwrap();
    std::fs::write(routes.join("health.rs"), "pub fn get() -> String {}").unwrap();
    std::fs::write(
        tmp.path().join("postern.yaml"),
        "controllers:\n  glob: [\"routes/**/*.rs\"]\noutput: build.pta\n",
    )
    .unwrap();

    postern()
        .current_dir(tmp.path())
        .arg("compile")
        .assert()
        .success();

    let manifest = postern_compiler::load_manifest(&tmp.path().join("build.pta")).unwrap();
    assert_eq!(manifest.sources[0].file, "routes/health.rs");
}

// ---------------------------------------------------------------------------
// postern inspect
// ---------------------------------------------------------------------------

#[test]
fn inspect_prints_manifest() {
    let tmp = TempDir::new().unwrap();
    let artifact = tmp.path().join("app.pta");
    postern()
        .args(["compile", "--config"])
        .arg(fixture_config("basic"))
        .arg("--output")
        .arg(&artifact)
        .assert()
        .success();

    let output = postern()
        .arg("inspect")
        .arg(&artifact)
        .assert()
        .success()
        .get_output()
        .clone();

    let v = stdout_json(&output);
    assert_eq!(v["routes_count"], 4);
    assert_eq!(v["postern_artifact_version"], 1);
    assert!(v["checksums"]["routes.json"]
        .as_str()
        .is_some_and(|c| c.starts_with("sha256:")));
}

#[test]
fn inspect_missing_artifact_exits_one() {
    postern()
        .args(["inspect", "missing.pta"])
        .assert()
        .failure()
        .code(1)
        .stderr(contains("artifact not found"));
}

// ---------------------------------------------------------------------------
// global flags
// ---------------------------------------------------------------------------

#[test]
fn unknown_log_format_is_rejected() {
    postern()
        .args(["--log-format", "xml", "inspect", "missing.pta"])
        .assert()
        .failure()
        .code(2)
        .stderr(contains("unknown log format"));
}

#[test]
fn help_lists_subcommands() {
    postern()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("compile").and(contains("validate")).and(contains("inspect")));
}

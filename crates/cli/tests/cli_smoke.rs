//! CLI smoke tests for stepwise.
//!
//! Each test gets its own temp directory holding a graph file, its sources
//! and the build root.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

/// Copies `src` into `site`.
const GRAPH: &str = r#"{
  "nodes": [
    { "kind": "source", "id": "src", "path": "src" },
    { "kind": "step", "id": "site", "dependencies": ["src"], "step": { "type": "copy" } }
  ]
}"#;

struct TestEnv {
  temp: TempDir,
}

impl TestEnv {
  fn new(graph: &str) -> Self {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("graph.json"), graph).unwrap();
    std::fs::create_dir_all(temp.path().join("src")).unwrap();
    std::fs::write(temp.path().join("src/index.md"), "hello").unwrap();
    Self { temp }
  }

  fn graph(&self) -> PathBuf {
    self.temp.path().join("graph.json")
  }

  fn root(&self) -> PathBuf {
    self.temp.path().join("root")
  }

  fn cmd(&self) -> Command {
    let mut cmd = cargo_bin_cmd!("stepwise");
    cmd
      .arg("--root")
      .arg(self.root())
      .env_remove("STEPWISE_ROOT")
      .env_remove("STEPWISE_LOG");
    cmd
  }
}

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_works() {
  cargo_bin_cmd!("stepwise")
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("Usage"));
}

#[test]
fn version_flag_works() {
  cargo_bin_cmd!("stepwise")
    .arg("--version")
    .assert()
    .success()
    .stdout(predicate::str::contains("stepwise"));
}

#[test]
fn subcommand_help_works() {
  for cmd in &["build", "plan", "clean"] {
    cargo_bin_cmd!("stepwise")
      .arg(cmd)
      .arg("--help")
      .assert()
      .success()
      .stdout(predicate::str::contains("Usage"));
  }
}

// =============================================================================
// build
// =============================================================================

#[test]
fn build_then_rebuild_skips() {
  let env = TestEnv::new(GRAPH);

  env
    .cmd()
    .arg("build")
    .arg(env.graph())
    .assert()
    .success()
    .stdout(predicate::str::contains("Build complete!"))
    .stdout(predicate::str::contains("site (executed"));
  assert_eq!(
    std::fs::read_to_string(env.root().join("site/output/index.md")).unwrap(),
    "hello"
  );

  env
    .cmd()
    .arg("build")
    .arg(env.graph())
    .assert()
    .success()
    .stdout(predicate::str::contains("site (up to date)"));
}

#[test]
fn build_json_reports_statuses() {
  let env = TestEnv::new(GRAPH);

  let output = env
    .cmd()
    .args(["--output", "json", "build"])
    .arg(env.graph())
    .output()
    .unwrap();
  assert!(output.status.success());

  let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(report["executed"], 1);
  let statuses: Vec<_> = report["nodes"]
    .as_array()
    .unwrap()
    .iter()
    .map(|node| (node["name"].as_str().unwrap().to_string(), node["status"].as_str().unwrap().to_string()))
    .collect();
  assert_eq!(
    statuses,
    [("site".to_string(), "executed".to_string()), ("src".to_string(), "source".to_string())]
  );
}

#[test]
fn build_with_size_hash() {
  let env = TestEnv::new(GRAPH);

  env
    .cmd()
    .args(["--hash", "size", "-j", "1", "build"])
    .arg(env.graph())
    .assert()
    .success();
}

#[test]
fn unknown_hash_is_rejected() {
  let env = TestEnv::new(GRAPH);

  env
    .cmd()
    .args(["--hash", "md5", "build"])
    .arg(env.graph())
    .assert()
    .failure()
    .stderr(predicate::str::contains("unknown hash algorithm"));
}

#[cfg(unix)]
#[test]
fn failing_step_names_identity() {
  let env = TestEnv::new(
    r#"{ "nodes": [{ "kind": "step", "id": "broken", "step": { "type": "exec", "command": "exit 3" } }] }"#,
  );

  env
    .cmd()
    .arg("build")
    .arg(env.graph())
    .assert()
    .failure()
    .stderr(predicate::str::contains("failed to build broken"));
}

#[test]
fn build_nonexistent_graph_fails() {
  let env = TestEnv::new(GRAPH);

  env
    .cmd()
    .arg("build")
    .arg(env.temp.path().join("missing.json"))
    .assert()
    .failure()
    .stderr(predicate::str::contains("Failed to load graph"));
}

#[test]
fn invalid_graph_fails() {
  let env = TestEnv::new(r#"{ "nodes": [{ "kind": "step", "id": "a", "dependencies": ["nope"], "step": { "type": "copy" } }] }"#);

  env
    .cmd()
    .arg("plan")
    .arg(env.graph())
    .assert()
    .failure()
    .stderr(predicate::str::contains("nope"));
}

// =============================================================================
// plan
// =============================================================================

#[test]
fn plan_prints_waves_without_writing() {
  let env = TestEnv::new(GRAPH);

  env
    .cmd()
    .arg("plan")
    .arg(env.graph())
    .assert()
    .success()
    .stdout(predicate::str::contains("Wave 1:"))
    .stdout(predicate::str::contains("Wave 2:"))
    .stdout(predicate::str::contains("site (step)"));
  assert!(!env.root().exists());
}

// =============================================================================
// clean
// =============================================================================

#[test]
fn clean_removes_root() {
  let env = TestEnv::new(GRAPH);
  env.cmd().arg("build").arg(env.graph()).assert().success();
  assert!(env.root().exists());

  env
    .cmd()
    .args(["clean", "--force"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Removed"));
  assert!(!env.root().exists());
}

#[test]
fn clean_without_root_is_a_noop() {
  let env = TestEnv::new(GRAPH);

  env
    .cmd()
    .args(["clean", "--force"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Nothing to clean"));
}

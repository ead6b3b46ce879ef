//! Implementation of the `stepwise build` command.
//!
//! Loads a graph file, executes it against the build root and prints one line
//! per node as it finishes, followed by a summary.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use stepwise_lib::{BuildEvent, BuildResult, NodeStatus, execute, manifest};

use super::Settings;
use crate::output::{
  format_duration, print_error, print_json, print_skipped, print_started, print_stat, print_success,
};

#[derive(Debug, Serialize)]
struct BuildReport {
  root: PathBuf,
  hash: String,
  elapsed_ms: u128,
  executed: usize,
  reused: usize,
  skipped: usize,
  nodes: Vec<NodeReport>,
}

#[derive(Debug, Serialize)]
struct NodeReport {
  name: String,
  identity: String,
  status: NodeStatus,
  folder: PathBuf,
}

impl BuildReport {
  fn new(result: &BuildResult, settings: &Settings) -> Self {
    Self {
      root: settings.root.clone(),
      hash: settings.hash.to_string(),
      elapsed_ms: result.elapsed.as_millis(),
      executed: result.count(NodeStatus::Executed),
      reused: result.count(NodeStatus::Reused),
      skipped: result.count(NodeStatus::Skipped),
      nodes: result
        .nodes
        .iter()
        .map(|(name, node)| NodeReport {
          name: name.clone(),
          identity: node.identity.to_string(),
          status: node.status,
          folder: node.folder.clone(),
        })
        .collect(),
    }
  }
}

/// Print a line for each event. Sources are only shown with `--verbose`.
fn print_event(event: &BuildEvent, verbose: bool) {
  match event {
    BuildEvent::Started { identity } if verbose => print_started(identity.as_str()),
    BuildEvent::Started { .. } => {}
    BuildEvent::Skipped { identity, .. } => print_skipped(&format!("{} (up to date)", identity)),
    BuildEvent::Succeeded {
      identity,
      status: NodeStatus::Source,
      ..
    } => {
      if verbose {
        print_skipped(&format!("{} (source)", identity));
      }
    }
    BuildEvent::Succeeded {
      identity,
      status,
      elapsed,
    } => print_success(&format!("{} ({}, {})", identity, status, format_duration(*elapsed))),
    BuildEvent::Failed { identity, error, .. } => print_error(&format!("{}: {}", identity, error)),
  }
}

pub fn cmd_build(graph: &Path, settings: &Settings) -> Result<()> {
  let graph = manifest::load(graph).with_context(|| format!("Failed to load graph: {}", graph.display()))?;
  debug!(nodes = graph.len(), root = %settings.root.display(), "loaded graph");

  let mut config = settings.execute_config();
  if !settings.output.is_json() {
    let verbose = settings.verbose;
    config = config.with_listener(move |event: &BuildEvent| print_event(event, verbose));
  }

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let result = rt.block_on(execute(&graph, &config)).context("Build failed")?;

  let report = BuildReport::new(&result, settings);
  if settings.output.is_json() {
    print_json(&report)?;
  } else {
    println!();
    print_success("Build complete!");
    print_stat("Executed", &report.executed.to_string());
    print_stat("Reused", &report.reused.to_string());
    print_stat("Skipped", &report.skipped.to_string());
    print_stat("Duration", &format_duration(result.elapsed));
  }

  Ok(())
}

//! Implementation of the `stepwise plan` command.
//!
//! Prints the order a build would dispatch nodes in, grouped into waves whose
//! members only depend on earlier waves. Nothing is written to disk.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use stepwise_lib::graph::Body;
use stepwise_lib::{Graph, Identity, manifest};

use super::Settings;
use crate::output::{print_json, print_stat};

#[derive(Debug, Serialize)]
struct PlanReport {
  nodes: usize,
  sources: usize,
  steps: usize,
  waves: Vec<Vec<Identity>>,
}

pub fn cmd_plan(graph_path: &Path, settings: &Settings) -> Result<()> {
  let graph =
    manifest::load(graph_path).with_context(|| format!("Failed to load graph: {}", graph_path.display()))?;
  let waves = graph.plan().context("Failed to order graph")?;
  let report = PlanReport {
    nodes: graph.len(),
    sources: count_sources(&graph),
    steps: graph.len() - count_sources(&graph),
    waves,
  };

  if settings.output.is_json() {
    return print_json(&report);
  }

  println!("Plan: {}", graph_path.display());
  print_stat("Sources", &report.sources.to_string());
  print_stat("Steps", &report.steps.to_string());
  for (index, wave) in report.waves.iter().enumerate() {
    println!("Wave {}:", index + 1);
    for identity in wave {
      let kind = match graph.registration(identity).map(|registration| &registration.body) {
        Some(Body::Source(path)) => format!("source {}", path.display()),
        _ => "step".to_string(),
      };
      println!("  {} ({})", identity, kind);
    }
  }

  Ok(())
}

fn count_sources(graph: &Graph) -> usize {
  graph
    .registrations()
    .filter(|(_, registration)| registration.is_source())
    .count()
}

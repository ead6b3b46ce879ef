//! Declarative graph files.
//!
//! [`load`] reads a JSON [`GraphFile`] and registers it into a [`Graph`] in
//! file order, the same way code would through [`GraphBuilder`]. Step bodies
//! are limited to the built-in [`ExecStep`] and [`CopyStep`].

mod types;

pub use types::*;

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::graph::{Dependency, Graph, GraphBuilder, RegistrationError};
use crate::placeholder::PlaceholderError;
use crate::step::Step;
use crate::steps::{CopyStep, ExecStep};

#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("failed to read graph file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse graph file {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("invalid command for '{id}': {source}")]
  Placeholder {
    id: String,
    #[source]
    source: PlaceholderError,
  },

  #[error("replace of '{0}' needs exactly one of `step` or `path`")]
  InvalidReplace(String),

  #[error(transparent)]
  Registration(#[from] RegistrationError),
}

/// Read and register the graph file at `path`.
pub fn load(path: &Path) -> Result<Graph, ManifestError> {
  let file = read(path)?;
  let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
  file.define(&base)
}

/// Read and parse the graph file at `path` without registering it.
pub fn read(path: &Path) -> Result<GraphFile, ManifestError> {
  let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
    path: path.to_path_buf(),
    source,
  })?;
  serde_json::from_str(&text).map_err(|source| ManifestError::Parse {
    path: path.to_path_buf(),
    source,
  })
}

impl GraphFile {
  /// Register every node. Relative source paths resolve against `base`.
  pub fn define(&self, base: &Path) -> Result<Graph, ManifestError> {
    let nodes = prepare_all(&self.nodes, base)?;
    debug!(nodes = nodes.len(), base = %base.display(), "registering graph file");
    Ok(Graph::define(|graph| register_all(graph, &nodes))?)
  }
}

/// A node whose step bodies are constructed and paths resolved, so that
/// registration can only fail with a [`RegistrationError`].
enum Prepared {
  Source {
    id: String,
    path: PathBuf,
  },
  Step {
    id: String,
    dependencies: Vec<Dependency>,
    step: Arc<dyn Step>,
  },
  Module {
    id: String,
    dependencies: Vec<Dependency>,
    exports: BTreeMap<String, Option<String>>,
    nodes: Vec<Prepared>,
  },
  Prepend {
    target: String,
    id: String,
    step: Arc<dyn Step>,
  },
  Append {
    target: String,
    id: String,
    step: Arc<dyn Step>,
  },
  ReplaceStep {
    id: String,
    step: Arc<dyn Step>,
  },
  ReplaceSource {
    id: String,
    path: PathBuf,
  },
}

fn prepare_all(nodes: &[NodeDef], base: &Path) -> Result<Vec<Prepared>, ManifestError> {
  nodes.iter().map(|node| prepare(node, base)).collect()
}

fn prepare(node: &NodeDef, base: &Path) -> Result<Prepared, ManifestError> {
  Ok(match node {
    NodeDef::Source { id, path } => Prepared::Source {
      id: id.clone(),
      path: base.join(path),
    },
    NodeDef::Step {
      id,
      dependencies,
      step,
    } => Prepared::Step {
      id: id.clone(),
      dependencies: dependencies.iter().map(dependency).collect(),
      step: build_step(id, step)?,
    },
    NodeDef::Module {
      id,
      dependencies,
      exports,
      nodes,
    } => Prepared::Module {
      id: id.clone(),
      dependencies: dependencies.iter().map(dependency).collect(),
      exports: exports.clone(),
      nodes: prepare_all(nodes, base)?,
    },
    NodeDef::Prepend { target, id, step } => Prepared::Prepend {
      target: target.clone(),
      id: id.clone(),
      step: build_step(id, step)?,
    },
    NodeDef::Append { target, id, step } => Prepared::Append {
      target: target.clone(),
      id: id.clone(),
      step: build_step(id, step)?,
    },
    NodeDef::Replace { id, step, path } => match (step, path) {
      (Some(step), None) => Prepared::ReplaceStep {
        id: id.clone(),
        step: build_step(id, step)?,
      },
      (None, Some(path)) => Prepared::ReplaceSource {
        id: id.clone(),
        path: base.join(path),
      },
      _ => return Err(ManifestError::InvalidReplace(id.clone())),
    },
  })
}

fn dependency(def: &DependencyDef) -> Dependency {
  match def {
    DependencyDef::Reference(reference) => Dependency::on(reference.as_str()),
    DependencyDef::Aliased { id, alias: None } => Dependency::on(id.as_str()),
    DependencyDef::Aliased { id, alias: Some(alias) } => Dependency::on(id.as_str()).alias(alias.as_str()),
  }
}

fn build_step(id: &str, def: &StepDef) -> Result<Arc<dyn Step>, ManifestError> {
  let placeholder = |source| ManifestError::Placeholder {
    id: id.to_string(),
    source,
  };

  match def {
    StepDef::Exec {
      command,
      env,
      always_run,
      shell,
    } => {
      let mut step = ExecStep::new(command.as_str()).map_err(placeholder)?;
      for (key, value) in env {
        step = step.with_env(key.as_str(), value).map_err(placeholder)?;
      }
      if let Some(shell) = shell {
        step = step.with_shell(shell.as_str());
      }
      Ok(Arc::new(step.with_always_run(*always_run)))
    }
    StepDef::Copy { only: Some(prefix) } => Ok(Arc::new(CopyStep::only(prefix.as_str()))),
    StepDef::Copy { only: None } => Ok(Arc::new(CopyStep::new())),
  }
}

fn register_all(graph: &mut GraphBuilder<'_>, nodes: &[Prepared]) -> Result<(), RegistrationError> {
  for node in nodes {
    match node {
      Prepared::Source { id, path } => {
        graph.add_source(id, path.clone())?;
      }
      Prepared::Step {
        id,
        dependencies,
        step,
      } => {
        graph.add_step(id, step.clone(), dependencies.iter().cloned())?;
      }
      Prepared::Module {
        id,
        dependencies,
        exports,
        nodes,
      } => {
        let resolve = |member: &str| match exports.get(member) {
          Some(alias) => alias.clone(),
          None => Some(member.to_string()),
        };
        graph.add_module_with_exports(id, dependencies.iter().cloned(), resolve, |module, _| {
          register_all(module, nodes)
        })?;
      }
      Prepared::Prepend { target, id, step } => {
        graph.prepend_step(target, id, step.clone())?;
      }
      Prepared::Append { target, id, step } => {
        graph.append_step(target, id, step.clone())?;
      }
      Prepared::ReplaceStep { id, step } => graph.replace_step(id, step.clone())?,
      Prepared::ReplaceSource { id, path } => graph.replace_source(id, path.clone())?,
    }
  }
  Ok(())
}

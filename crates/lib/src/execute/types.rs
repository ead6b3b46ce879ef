//! Types for graph execution.
//!
//! This module defines the error types, result types, build events, and
//! configuration for executing a [`Graph`](crate::graph::Graph).

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::checksum::{ChecksumError, Snapshot};
use crate::hash::HashAlgorithm;
use crate::identity::Identity;
use crate::paths::default_root;
use crate::root_lock::RootLockError;
use crate::step::StepError;

/// Why a single node failed.
#[derive(Debug, Error)]
pub enum NodeError {
  /// The step body returned an error.
  #[error("step failed")]
  Step(#[source] StepError),

  /// The step asked to keep its previous output but none was available.
  #[error("cannot reuse non-existent or initial output")]
  ReuseWithoutPrevious,

  /// A source's folder does not exist or is not a directory.
  #[error("source folder not found: {0}")]
  SourceMissing(PathBuf),

  #[error("io error: {0}")]
  Io(#[from] io::Error),

  #[error(transparent)]
  Checksum(#[from] ChecksumError),

  /// A node task panicked or was cancelled.
  #[error("task failed: {0}")]
  Join(String),

  /// The node was never started because another node already failed.
  #[error("not started: the build already failed")]
  Halted,
}

/// Errors returned by [`execute`](super::execute).
#[derive(Debug, Error)]
pub enum ExecuteError {
  /// A node failed. The identity is the fully qualified registration path.
  #[error("failed to build {identity}")]
  Node {
    identity: Identity,
    #[source]
    source: NodeError,
  },

  /// Cycle detected in the dependency graph.
  #[error("dependency cycle detected")]
  CycleDetected,

  /// An edge points at an identity with no registration.
  #[error("edge to unregistered identity: {0}")]
  UnknownNode(Identity),

  #[error(transparent)]
  Lock(#[from] RootLockError),

  #[error("io error: {0}")]
  Io(#[from] io::Error),
}

impl ExecuteError {
  pub(crate) fn node(identity: &Identity, source: NodeError) -> Self {
    ExecuteError::Node {
      identity: identity.clone(),
      source,
    }
  }

  /// The failing node, if the error is attributable to one.
  pub fn identity(&self) -> Option<&Identity> {
    match self {
      ExecuteError::Node { identity, .. } => Some(identity),
      _ => None,
    }
  }
}

/// What happened to a node during a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
  /// A source folder, fingerprinted in place.
  Source,
  /// The step ran and published new output.
  Executed,
  /// The step ran and chose to keep its previous output.
  Reused,
  /// The step did not run; its previous output was still valid.
  Skipped,
}

impl NodeStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      NodeStatus::Source => "source",
      NodeStatus::Executed => "executed",
      NodeStatus::Reused => "reused",
      NodeStatus::Skipped => "skipped",
    }
  }
}

impl fmt::Display for NodeStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// The published state of one node.
#[derive(Debug, Clone)]
pub struct NodeResult {
  /// Fully qualified identity of the node.
  pub identity: Identity,
  /// Folder holding the node's current content.
  pub folder: PathBuf,
  /// Fingerprints of `folder`.
  pub checksums: Arc<Snapshot>,
  pub status: NodeStatus,
}

/// Result of a successful build, keyed by exported name.
///
/// Nodes hidden by an export resolver do not appear.
#[derive(Debug, Clone, Default)]
pub struct BuildResult {
  pub nodes: BTreeMap<String, NodeResult>,
  pub elapsed: Duration,
}

impl BuildResult {
  pub fn get(&self, name: &str) -> Option<&NodeResult> {
    self.nodes.get(name)
  }

  pub fn folder(&self, name: &str) -> Option<&Path> {
    self.nodes.get(name).map(|node| node.folder.as_path())
  }

  pub fn status(&self, name: &str) -> Option<NodeStatus> {
    self.nodes.get(name).map(|node| node.status)
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// Number of exported nodes with the given status.
  pub fn count(&self, status: NodeStatus) -> usize {
    self.nodes.values().filter(|node| node.status == status).count()
  }

  /// Names of exported nodes with the given status.
  pub fn names_with(&self, status: NodeStatus) -> Vec<&str> {
    self
      .nodes
      .iter()
      .filter(|(_, node)| node.status == status)
      .map(|(name, _)| name.as_str())
      .collect()
  }
}

/// Progress notifications emitted while a build runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
  /// A node was dispatched.
  Started { identity: Identity },
  /// A step's previous output was still valid and it did not run.
  Skipped { identity: Identity, elapsed: Duration },
  /// A node finished; `status` tells whether it produced new output.
  Succeeded {
    identity: Identity,
    status: NodeStatus,
    elapsed: Duration,
  },
  /// A node failed. `error` is the rendered cause.
  Failed {
    identity: Identity,
    error: String,
    elapsed: Duration,
  },
}

impl BuildEvent {
  pub fn identity(&self) -> &Identity {
    match self {
      BuildEvent::Started { identity }
      | BuildEvent::Skipped { identity, .. }
      | BuildEvent::Succeeded { identity, .. }
      | BuildEvent::Failed { identity, .. } => identity,
    }
  }
}

/// Receives [`BuildEvent`]s. Called from worker tasks, possibly concurrently.
pub trait BuildListener: Send + Sync {
  fn on_event(&self, event: &BuildEvent);
}

impl<F> BuildListener for F
where
  F: Fn(&BuildEvent) + Send + Sync,
{
  fn on_event(&self, event: &BuildEvent) {
    self(event)
  }
}

/// Configuration for graph execution.
#[derive(Clone)]
pub struct ExecuteConfig {
  /// Directory holding one subtree per identity.
  pub root: PathBuf,

  /// Fingerprint function used for every snapshot.
  pub hash: HashAlgorithm,

  /// Maximum number of nodes running at once.
  pub parallelism: usize,

  /// Optional progress callback.
  pub listener: Option<Arc<dyn BuildListener>>,
}

impl ExecuteConfig {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      ..Self::default()
    }
  }

  pub fn with_hash(mut self, hash: HashAlgorithm) -> Self {
    self.hash = hash;
    self
  }

  pub fn with_parallelism(mut self, parallelism: usize) -> Self {
    self.parallelism = parallelism.max(1);
    self
  }

  pub fn with_listener(mut self, listener: impl BuildListener + 'static) -> Self {
    self.listener = Some(Arc::new(listener));
    self
  }

  pub(crate) fn emit(&self, event: BuildEvent) {
    if let Some(listener) = &self.listener {
      listener.on_event(&event);
    }
  }
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      root: default_root(),
      hash: HashAlgorithm::default(),
      parallelism: num_cpus(),
      listener: None,
    }
  }
}

impl fmt::Debug for ExecuteConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ExecuteConfig")
      .field("root", &self.root)
      .field("hash", &self.hash)
      .field("parallelism", &self.parallelism)
      .field("listener", &self.listener.is_some())
      .finish()
  }
}

/// Get the number of CPUs for default parallelism.
fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}

//! The step plugin contract.
//!
//! A [`Step`] is the body of a graph node. The engine hands it a
//! [`StepContext`] (where to read the previous output and write the next one)
//! and its [`Arguments`] (one [`StepArgument`] per dependency, keyed by the
//! name under which the step observes that dependency).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::checksum::ChecksumStatus;
use crate::identity::is_ancestor;

/// Error type returned by step bodies.
pub type StepError = Box<dyn std::error::Error + Send + Sync>;

/// A step's view of its dependencies, keyed by local (possibly synonym) name.
pub type Arguments = BTreeMap<String, StepArgument>;

/// One dependency as observed by a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepArgument {
  folder: PathBuf,
  files: BTreeMap<String, ChecksumStatus>,
}

impl StepArgument {
  pub fn new(folder: PathBuf, files: BTreeMap<String, ChecksumStatus>) -> Self {
    Self { folder, files }
  }

  /// The folder holding the dependency's current content.
  pub fn folder(&self) -> &Path {
    &self.folder
  }

  /// Every path seen now or at the step's last run, with its status.
  pub fn files(&self) -> &BTreeMap<String, ChecksumStatus> {
    &self.files
  }

  pub fn has_changes(&self) -> bool {
    self.files.values().any(|status| status.is_changed())
  }

  /// True if any path equal to or below `prefix` changed.
  pub fn has_changes_under(&self, prefix: &str) -> bool {
    self
      .files
      .iter()
      .any(|(path, status)| status.is_changed() && is_under(prefix, path))
  }

  /// Paths whose status is not [`ChecksumStatus::Retained`].
  pub fn changed(&self) -> impl Iterator<Item = (&str, ChecksumStatus)> {
    self
      .files
      .iter()
      .filter(|(_, status)| status.is_changed())
      .map(|(path, status)| (path.as_str(), *status))
  }
}

/// True if `path` equals `prefix` or lies below it. An empty prefix matches everything.
pub fn is_under(prefix: &str, path: &str) -> bool {
  let prefix = prefix.trim_end_matches('/');
  prefix.is_empty() || path == prefix || is_ancestor(prefix, path)
}

/// Directories available to a running step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepContext {
  previous: Option<PathBuf>,
  next: PathBuf,
  supplement: PathBuf,
}

impl StepContext {
  pub fn new(previous: Option<PathBuf>, next: PathBuf, supplement: PathBuf) -> Self {
    Self {
      previous,
      next,
      supplement,
    }
  }

  /// The last published output, if it is still consistent with its snapshot.
  pub fn previous(&self) -> Option<&Path> {
    self.previous.as_deref()
  }

  /// Fresh, empty directory the step writes its output into.
  pub fn next(&self) -> &Path {
    &self.next
  }

  /// Scratch space for by-products such as captured process output.
  /// Discarded after the step finishes and never fingerprinted.
  pub fn supplement(&self) -> &Path {
    &self.supplement
  }
}

/// What a step body did with its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
  /// The step wrote a complete new output into `next`.
  Produced,
  /// The previous output is still valid; `next` is discarded.
  ReusePrevious,
}

/// A pluggable build step.
#[async_trait]
pub trait Step: Send + Sync {
  /// Run even when no dependency changed and the previous output is intact.
  fn always_run(&self) -> bool {
    false
  }

  /// Decide whether the diffed arguments warrant a run. Only consulted when
  /// a consistent previous output exists, every dependency has a recorded
  /// snapshot and [`Step::always_run`] is false.
  fn should_run(&self, arguments: &Arguments) -> bool {
    arguments.values().any(StepArgument::has_changes)
  }

  async fn apply(&self, context: &StepContext, arguments: &Arguments) -> Result<StepOutcome, StepError>;
}

#[async_trait]
impl<T: Step + ?Sized> Step for Box<T> {
  fn always_run(&self) -> bool {
    (**self).always_run()
  }

  fn should_run(&self, arguments: &Arguments) -> bool {
    (**self).should_run(arguments)
  }

  async fn apply(&self, context: &StepContext, arguments: &Arguments) -> Result<StepOutcome, StepError> {
    (**self).apply(context, arguments).await
  }
}

#[async_trait]
impl<T: Step + ?Sized> Step for Arc<T> {
  fn always_run(&self) -> bool {
    (**self).always_run()
  }

  fn should_run(&self, arguments: &Arguments) -> bool {
    (**self).should_run(arguments)
  }

  async fn apply(&self, context: &StepContext, arguments: &Arguments) -> Result<StepOutcome, StepError> {
    (**self).apply(context, arguments).await
  }
}

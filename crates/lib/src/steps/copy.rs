//! Folder-merge step.
//!
//! Copies every dependency folder into `next`, in key order, so a later key
//! wins when two dependencies provide the same path. With a consistent
//! previous output the merge is incremental: the previous output is carried
//! forward and every changed path is resolved again across all dependencies,
//! so the result matches a full merge.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;
use walkdir::WalkDir;

use crate::checksum::ChecksumStatus;
use crate::step::{Arguments, Step, StepArgument, StepContext, StepError, StepOutcome};

/// Merges dependency folders into one output.
#[derive(Debug, Clone, Default)]
pub struct CopyStep {
  only: Option<String>,
}

impl CopyStep {
  pub fn new() -> Self {
    Self::default()
  }

  /// Only rerun when something under `prefix` changed in a dependency.
  pub fn only(prefix: impl Into<String>) -> Self {
    Self {
      only: Some(prefix.into()),
    }
  }

  pub fn prefix(&self) -> Option<&str> {
    self.only.as_deref()
  }
}

#[async_trait]
impl Step for CopyStep {
  fn should_run(&self, arguments: &Arguments) -> bool {
    match &self.only {
      Some(prefix) => arguments.values().any(|argument| argument.has_changes_under(prefix)),
      None => arguments.values().any(StepArgument::has_changes),
    }
  }

  async fn apply(&self, context: &StepContext, arguments: &Arguments) -> Result<StepOutcome, StepError> {
    let previous = context.previous().map(Path::to_path_buf);
    if previous.is_some() && !arguments.values().any(StepArgument::has_changes) {
      return Ok(StepOutcome::ReusePrevious);
    }

    let next = context.next().to_path_buf();
    let arguments = arguments.clone();
    tokio::task::spawn_blocking(move || merge(previous.as_deref(), &next, &arguments)).await??;
    Ok(StepOutcome::Produced)
  }
}

fn merge(previous: Option<&Path>, next: &Path, arguments: &Arguments) -> io::Result<()> {
  match previous {
    Some(previous) => {
      copy_tree(previous, next)?;
      let changed: BTreeSet<&str> = arguments
        .values()
        .flat_map(|argument| argument.changed().map(|(path, _)| path))
        .collect();
      for path in &changed {
        let target = next.join(relative(path));
        match provider(arguments, path) {
          Some(argument) => copy_file(&argument.folder().join(relative(path)), &target)?,
          None => remove_file(&target)?,
        }
      }
      debug!(next = %next.display(), changed = changed.len(), "applied incremental changes");
    }
    None => {
      for argument in arguments.values() {
        copy_tree(argument.folder(), next)?;
      }
      debug!(next = %next.display(), "copied dependency folders");
    }
  }
  Ok(())
}

/// The last argument, in key order, that currently holds `path`.
fn provider<'a>(arguments: &'a Arguments, path: &str) -> Option<&'a StepArgument> {
  arguments
    .values()
    .rev()
    .find(|argument| matches!(argument.files().get(path), Some(status) if *status != ChecksumStatus::Removed))
}

fn relative(key: &str) -> PathBuf {
  key.split('/').collect()
}

fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
  for entry in WalkDir::new(from).follow_links(true) {
    let entry = entry.map_err(io::Error::other)?;
    if !entry.file_type().is_file() {
      continue;
    }
    let relative = entry.path().strip_prefix(from).map_err(io::Error::other)?;
    copy_file(entry.path(), &to.join(relative))?;
  }
  Ok(())
}

fn copy_file(from: &Path, to: &Path) -> io::Result<()> {
  if let Some(parent) = to.parent() {
    fs::create_dir_all(parent)?;
  }
  fs::copy(from, to)?;
  Ok(())
}

fn remove_file(path: &Path) -> io::Result<()> {
  match fs::remove_file(path) {
    Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
    _ => Ok(()),
  }
}

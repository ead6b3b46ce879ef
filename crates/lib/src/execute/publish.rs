//! Per-node execution: the incremental decision, the temp workspace a step
//! runs in, and atomic publication of its results.
//!
//! Each identity owns `<root>/<identity>/`:
//!
//! ```text
//! output/                      last published result
//! checksum/checksums           snapshot of output/
//! checksum/checksums.<key>     snapshot of dependency <key> at the last run
//! .next-XXXXXX/                workspace of a run in progress
//! ```
//!
//! A run writes into a fresh workspace and only renames it into place once
//! the step has succeeded, so a failed run leaves `output/` and `checksum/`
//! exactly as they were.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::checksum::{ChecksumStatus, Snapshot};
use crate::consts::{CHECKSUM_DIR, CHECKSUM_FILE, OUTPUT_DIR, SUPPLEMENT_DIR, WORKSPACE_PREFIX};
use crate::hash::HashFunction;
use crate::identity::{Identity, key_file_name};
use crate::step::{Arguments, Step, StepArgument, StepContext, StepOutcome};

use super::types::{NodeError, NodeResult, NodeStatus};

/// Directory layout of one identity below the build root.
#[derive(Debug, Clone)]
pub struct NodeStore {
  dir: PathBuf,
}

impl NodeStore {
  pub fn new(root: &Path, identity: &Identity) -> Self {
    Self {
      dir: root.join(identity.relative_path()),
    }
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  pub fn output(&self) -> PathBuf {
    self.dir.join(OUTPUT_DIR)
  }

  pub fn checksum_dir(&self) -> PathBuf {
    self.dir.join(CHECKSUM_DIR)
  }

  /// Snapshot file of the published output.
  pub fn output_checksums(&self) -> PathBuf {
    self.checksum_dir().join(CHECKSUM_FILE)
  }

  /// Snapshot file of the dependency observed under `key`.
  pub fn dependency_checksums(&self, key: &str) -> PathBuf {
    self.checksum_dir().join(dependency_file_name(key))
  }
}

fn dependency_file_name(key: &str) -> String {
  format!("{}.{}", CHECKSUM_FILE, key_file_name(key))
}

/// A dependency's published state, as handed to a dependent.
#[derive(Debug, Clone)]
pub(crate) struct Input {
  pub key: String,
  pub node: NodeResult,
}

/// Fingerprint a source folder in place.
pub(crate) async fn run_source(
  identity: Identity,
  path: PathBuf,
  hash: Arc<dyn HashFunction>,
) -> Result<NodeResult, NodeError> {
  blocking(move || {
    if !path.is_dir() {
      return Err(NodeError::SourceMissing(path));
    }
    let folder = dunce::canonicalize(&path)?;
    let checksums = Snapshot::read_tree(&folder, hash.as_ref())?;
    debug!(identity = %identity, files = checksums.len(), "fingerprinted source");
    Ok(NodeResult {
      identity,
      folder,
      checksums: Arc::new(checksums),
      status: NodeStatus::Source,
    })
  })
  .await
}

/// Decide whether a step must run, run it if so, and publish the outcome.
pub(crate) async fn run_step(
  identity: Identity,
  step: Arc<dyn Step>,
  inputs: Vec<Input>,
  root: PathBuf,
  hash: Arc<dyn HashFunction>,
) -> Result<NodeResult, NodeError> {
  let store = NodeStore::new(&root, &identity);

  let inspection = {
    let store = store.clone();
    let hash = hash.clone();
    let identity = identity.clone();
    blocking(move || inspect(&identity, &store, inputs, hash.as_ref())).await?
  };

  let unchanged = |_: &Arc<Snapshot>| {
    !(inspection.unobserved || step.always_run() || step.should_run(&inspection.arguments))
  };
  if let Some(previous) = inspection.previous.clone().filter(unchanged) {
    debug!(identity = %identity, "inputs and output unchanged, skipping");
    return Ok(NodeResult {
      identity,
      folder: store.output(),
      checksums: previous,
      status: NodeStatus::Skipped,
    });
  }

  info!(identity = %identity, "executing step");

  let workspace = {
    let store = store.clone();
    blocking(move || Workspace::create(&store)).await?
  };
  let output = store.output();
  let context = StepContext::new(
    inspection.previous.as_ref().map(|_| output.clone()),
    workspace.next(),
    workspace.supplement(),
  );

  let outcome = step
    .apply(&context, &inspection.arguments)
    .await
    .map_err(NodeError::Step)?;

  let observed = inspection.observed;
  match outcome {
    StepOutcome::Produced => {
      let checksums = blocking(move || {
        let checksums = Snapshot::read_tree(&workspace.next(), hash.as_ref())?;
        workspace.stage_checksums(&checksums, &observed)?;
        workspace.publish_output(&store)?;
        Ok(checksums)
      })
      .await?;

      debug!(identity = %identity, files = checksums.len(), "published new output");
      Ok(NodeResult {
        identity,
        folder: output,
        checksums: Arc::new(checksums),
        status: NodeStatus::Executed,
      })
    }
    StepOutcome::ReusePrevious => {
      let Some(previous) = inspection.previous else {
        return Err(NodeError::ReuseWithoutPrevious);
      };
      let snapshot = previous.clone();
      blocking(move || {
        workspace.stage_checksums(&snapshot, &observed)?;
        workspace.publish_checksums(&store)
      })
      .await?;

      debug!(identity = %identity, "kept previous output, refreshed dependency snapshots");
      Ok(NodeResult {
        identity,
        folder: output,
        checksums: previous,
        status: NodeStatus::Reused,
      })
    }
  }
}

/// What a step sees before it runs.
struct Inspection {
  /// Snapshot of the published output, if it is still consistent with it.
  previous: Option<Arc<Snapshot>>,
  /// Some dependency has never been recorded for this step.
  unobserved: bool,
  arguments: Arguments,
  /// Current snapshot of every dependency, keyed like `arguments`.
  observed: Vec<(String, Arc<Snapshot>)>,
}

fn inspect(
  identity: &Identity,
  store: &NodeStore,
  inputs: Vec<Input>,
  hash: &dyn HashFunction,
) -> Result<Inspection, NodeError> {
  let previous = match Snapshot::read(&store.output_checksums())? {
    Some(snapshot) if snapshot.is_consistent_with(&store.output(), hash)? => Some(Arc::new(snapshot)),
    Some(_) => {
      warn!(
        identity = %identity,
        output = %store.output().display(),
        "published output was modified since the last build, rebuilding"
      );
      None
    }
    None => None,
  };

  let mut unobserved = false;
  let mut arguments = Arguments::new();
  let mut observed = Vec::with_capacity(inputs.len());
  for Input { key, node } in inputs {
    let recorded = match Snapshot::read(&store.dependency_checksums(&key))? {
      Some(snapshot) => snapshot,
      None => {
        unobserved = true;
        Snapshot::new()
      }
    };
    let files = ChecksumStatus::diff(&recorded, &node.checksums);
    arguments.insert(key.clone(), StepArgument::new(node.folder, files));
    observed.push((key, node.checksums));
  }

  Ok(Inspection {
    previous,
    unobserved,
    arguments,
    observed,
  })
}

/// Per-run scratch area inside the identity's directory.
///
/// Dropping it removes everything not yet renamed into place.
struct Workspace {
  dir: TempDir,
}

impl Workspace {
  fn create(store: &NodeStore) -> Result<Self, NodeError> {
    fs::create_dir_all(store.dir())?;
    let dir = tempfile::Builder::new().prefix(WORKSPACE_PREFIX).tempdir_in(store.dir())?;
    let workspace = Self { dir };
    fs::create_dir(workspace.next())?;
    fs::create_dir(workspace.supplement())?;
    Ok(workspace)
  }

  fn next(&self) -> PathBuf {
    self.dir.path().join(OUTPUT_DIR)
  }

  fn supplement(&self) -> PathBuf {
    self.dir.path().join(SUPPLEMENT_DIR)
  }

  fn staged_checksums(&self) -> PathBuf {
    self.dir.path().join(CHECKSUM_DIR)
  }

  /// Write the output snapshot and every dependency snapshot into the workspace.
  fn stage_checksums(&self, output: &Snapshot, observed: &[(String, Arc<Snapshot>)]) -> Result<(), NodeError> {
    let staged = self.staged_checksums();
    fs::create_dir_all(&staged)?;
    output.write(&staged.join(CHECKSUM_FILE))?;
    for (key, snapshot) in observed {
      snapshot.write(&staged.join(dependency_file_name(key)))?;
    }
    Ok(())
  }

  /// Replace the published output and snapshots with the workspace's.
  ///
  /// The old snapshot directory goes first: if publication is interrupted,
  /// the next run finds no snapshot and rebuilds. A failed rename puts
  /// every moved directory back before the workspace is dropped.
  fn publish_output(self, store: &NodeStore) -> Result<(), NodeError> {
    let mut renames = Renames::default();
    let swapped = renames
      .rename_if_exists(&store.checksum_dir(), &self.dir.path().join(RETIRED_CHECKSUM_DIR))
      .and_then(|()| renames.rename_if_exists(&store.output(), &self.dir.path().join(RETIRED_OUTPUT_DIR)))
      .and_then(|()| renames.rename(&self.next(), &store.output()))
      .and_then(|()| renames.rename(&self.staged_checksums(), &store.checksum_dir()));
    if let Err(e) = swapped {
      renames.undo();
      return Err(e.into());
    }
    Ok(())
  }

  /// Replace only the snapshots, keeping the published output.
  fn publish_checksums(self, store: &NodeStore) -> Result<(), NodeError> {
    let mut renames = Renames::default();
    let swapped = renames
      .rename_if_exists(&store.checksum_dir(), &self.dir.path().join(RETIRED_CHECKSUM_DIR))
      .and_then(|()| renames.rename(&self.staged_checksums(), &store.checksum_dir()));
    if let Err(e) = swapped {
      renames.undo();
      return Err(e.into());
    }
    Ok(())
  }
}

const RETIRED_OUTPUT_DIR: &str = "retired-output";
const RETIRED_CHECKSUM_DIR: &str = "retired-checksum";

/// Renames performed so far, in order, so they can be reverted.
#[derive(Default)]
struct Renames(Vec<(PathBuf, PathBuf)>);

impl Renames {
  fn rename(&mut self, from: &Path, to: &Path) -> io::Result<()> {
    fs::rename(from, to)?;
    self.0.push((from.to_path_buf(), to.to_path_buf()));
    Ok(())
  }

  fn rename_if_exists(&mut self, from: &Path, to: &Path) -> io::Result<()> {
    match fs::symlink_metadata(from) {
      Ok(_) => self.rename(from, to),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(e),
    }
  }

  fn undo(self) {
    for (from, to) in self.0.into_iter().rev() {
      if let Err(e) = fs::rename(&to, &from) {
        warn!(from = %to.display(), to = %from.display(), error = %e, "failed to roll back publication");
      }
    }
  }
}

/// Run blocking filesystem work off the async workers.
async fn blocking<T, F>(work: F) -> Result<T, NodeError>
where
  F: FnOnce() -> Result<T, NodeError> + Send + 'static,
  T: Send + 'static,
{
  tokio::task::spawn_blocking(work)
    .await
    .map_err(|e| NodeError::Join(e.to_string()))?
}

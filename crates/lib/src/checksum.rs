//! Checksum snapshots: persisted path → fingerprint maps.
//!
//! A [`Snapshot`] maps each file below a folder (relative path, `/`-separated)
//! to its fingerprint. Snapshots are persisted as alternating lines of path and
//! hex-encoded fingerprint, and diffed with [`ChecksumStatus::diff`] to find
//! what changed since a step last ran.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path};

use serde::Serialize;
use tempfile::NamedTempFile;
use thiserror::Error;
use walkdir::WalkDir;

use crate::hash::HashFunction;

/// Errors raised while computing, reading or writing snapshots.
#[derive(Debug, Error)]
pub enum ChecksumError {
  #[error("failed to walk {path}: {message}")]
  Walk { path: String, message: String },

  #[error("failed to hash {path}: {source}")]
  Hash {
    path: String,
    #[source]
    source: io::Error,
  },

  #[error("path cannot be recorded in a snapshot: {0}")]
  UnsupportedPath(String),

  #[error("malformed snapshot file {path}: {message}")]
  Malformed { path: String, message: String },

  #[error("io error: {0}")]
  Io(#[from] io::Error),
}

/// Relative path → fingerprint bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot(BTreeMap<String, Vec<u8>>);

impl Snapshot {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, path: impl Into<String>, fingerprint: Vec<u8>) {
    self.0.insert(path.into(), fingerprint);
  }

  pub fn get(&self, path: &str) -> Option<&[u8]> {
    self.0.get(path).map(Vec::as_slice)
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn paths(&self) -> impl Iterator<Item = &str> {
    self.0.keys().map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
    self.0.iter().map(|(path, fingerprint)| (path.as_str(), fingerprint.as_slice()))
  }

  /// Fingerprint every file below `root`.
  ///
  /// The walk is depth-first in file-name order. Directories contribute only
  /// through the files they contain.
  pub fn read_tree(root: &Path, hash: &dyn HashFunction) -> Result<Self, ChecksumError> {
    let mut snapshot = Snapshot::new();

    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
      let entry = entry.map_err(|e| ChecksumError::Walk {
        path: root.display().to_string(),
        message: e.to_string(),
      })?;
      if !entry.file_type().is_file() {
        continue;
      }

      let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
      let key = relative_key(relative)?;
      let fingerprint = hash.hash(entry.path()).map_err(|source| ChecksumError::Hash {
        path: entry.path().display().to_string(),
        source,
      })?;
      snapshot.insert(key, fingerprint);
    }

    Ok(snapshot)
  }

  /// Load a persisted snapshot. Returns `None` if the file does not exist.
  pub fn read(file: &Path) -> Result<Option<Self>, ChecksumError> {
    let content = match fs::read_to_string(file) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(e.into()),
    };

    let malformed = |message: String| ChecksumError::Malformed {
      path: file.display().to_string(),
      message,
    };

    let mut snapshot = Snapshot::new();
    let mut lines = content.lines();
    while let Some(path) = lines.next() {
      let encoded = lines
        .next()
        .ok_or_else(|| malformed(format!("missing fingerprint for '{}'", path)))?;
      let fingerprint = hex::decode(encoded).map_err(|e| malformed(format!("bad fingerprint for '{}': {}", path, e)))?;
      snapshot.insert(path, fingerprint);
    }

    Ok(Some(snapshot))
  }

  /// Persist this snapshot.
  ///
  /// Writes to an anonymous temp file in the same directory and persists it
  /// over `file`, so a reader never observes a half-written snapshot. The
  /// temp name starts with `.`, which no snapshot file name does.
  pub fn write(&self, file: &Path) -> Result<(), ChecksumError> {
    let mut content = String::new();
    for (path, fingerprint) in &self.0 {
      content.push_str(path);
      content.push('\n');
      content.push_str(&hex::encode(fingerprint));
      content.push('\n');
    }

    let dir = file.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(content.as_bytes())?;
    temp.persist(file).map_err(io::Error::from)?;
    Ok(())
  }

  /// Recompute fingerprints for `folder` and compare them with this snapshot.
  ///
  /// Returns `false` if the folder is missing, if the path sets differ, or if
  /// any fingerprint differs.
  pub fn is_consistent_with(&self, folder: &Path, hash: &dyn HashFunction) -> Result<bool, ChecksumError> {
    if !folder.is_dir() {
      return Ok(false);
    }
    Ok(Snapshot::read_tree(folder, hash)? == *self)
  }
}

impl FromIterator<(String, Vec<u8>)> for Snapshot {
  fn from_iter<T: IntoIterator<Item = (String, Vec<u8>)>>(iter: T) -> Self {
    Snapshot(iter.into_iter().collect())
  }
}

/// How a single path changed between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumStatus {
  Added,
  Altered,
  Removed,
  Retained,
}

impl ChecksumStatus {
  /// Diff the `current` (live) snapshot against the `previous` (persisted) one.
  ///
  /// - only in `current` → [`ChecksumStatus::Added`]
  /// - only in `previous` → [`ChecksumStatus::Removed`]
  /// - in both, same bytes → [`ChecksumStatus::Retained`]
  /// - in both, different bytes → [`ChecksumStatus::Altered`]
  pub fn diff(previous: &Snapshot, current: &Snapshot) -> BTreeMap<String, ChecksumStatus> {
    let mut statuses = BTreeMap::new();

    for (path, fingerprint) in current.iter() {
      let status = match previous.get(path) {
        None => ChecksumStatus::Added,
        Some(old) if old == fingerprint => ChecksumStatus::Retained,
        Some(_) => ChecksumStatus::Altered,
      };
      statuses.insert(path.to_string(), status);
    }

    for path in previous.paths() {
      if current.get(path).is_none() {
        statuses.insert(path.to_string(), ChecksumStatus::Removed);
      }
    }

    statuses
  }

  pub fn is_changed(self) -> bool {
    self != ChecksumStatus::Retained
  }
}

/// Convert a relative path into a `/`-separated snapshot key.
fn relative_key(relative: &Path) -> Result<String, ChecksumError> {
  let mut segments = Vec::new();
  for component in relative.components() {
    match component {
      Component::Normal(part) => {
        let part = part
          .to_str()
          .ok_or_else(|| ChecksumError::UnsupportedPath(relative.display().to_string()))?;
        segments.push(part);
      }
      _ => return Err(ChecksumError::UnsupportedPath(relative.display().to_string())),
    }
  }

  let key = segments.join("/");
  if key.is_empty() || key.contains('\n') || key.contains('\r') {
    return Err(ChecksumError::UnsupportedPath(relative.display().to_string()));
  }
  Ok(key)
}

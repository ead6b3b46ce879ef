//! File fingerprinting for change detection.
//!
//! This module provides:
//! - [`HashFunction`]: the pluggable fingerprint contract
//! - [`Sha256Digest`]: content digest (default, strongest)
//! - [`FileSize`] and [`ModifiedTime`]: cheap, weaker alternatives
//! - [`HashAlgorithm`]: a serializable selector used by configuration

use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Computes a fingerprint for a single file.
pub trait HashFunction: Send + Sync + fmt::Debug {
  fn hash(&self, file: &Path) -> io::Result<Vec<u8>>;
}

/// SHA-256 over the file's contents.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Digest;

impl HashFunction for Sha256Digest {
  fn hash(&self, file: &Path) -> io::Result<Vec<u8>> {
    let mut file = fs::File::open(file)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
      let bytes_read = file.read(&mut buffer)?;
      if bytes_read == 0 {
        break;
      }
      hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize().to_vec())
  }
}

/// The file's length in bytes, big-endian.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSize;

impl HashFunction for FileSize {
  fn hash(&self, file: &Path) -> io::Result<Vec<u8>> {
    Ok(fs::metadata(file)?.len().to_be_bytes().to_vec())
  }
}

/// The file's modification time in nanoseconds since the epoch, big-endian.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModifiedTime;

impl HashFunction for ModifiedTime {
  fn hash(&self, file: &Path) -> io::Result<Vec<u8>> {
    let modified = fs::metadata(file)?.modified()?;
    let nanos = modified
      .duration_since(UNIX_EPOCH)
      .map(|d| d.as_nanos())
      .unwrap_or_default();
    Ok(nanos.to_be_bytes().to_vec())
  }
}

/// Selects one of the built-in hash functions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
  #[default]
  Sha256,
  Size,
  Mtime,
}

impl HashAlgorithm {
  pub const ALL: [HashAlgorithm; 3] = [HashAlgorithm::Sha256, HashAlgorithm::Size, HashAlgorithm::Mtime];

  pub fn function(self) -> Arc<dyn HashFunction> {
    match self {
      HashAlgorithm::Sha256 => Arc::new(Sha256Digest),
      HashAlgorithm::Size => Arc::new(FileSize),
      HashAlgorithm::Mtime => Arc::new(ModifiedTime),
    }
  }

  pub fn name(self) -> &'static str {
    match self {
      HashAlgorithm::Sha256 => "sha256",
      HashAlgorithm::Size => "size",
      HashAlgorithm::Mtime => "mtime",
    }
  }
}

impl fmt::Display for HashAlgorithm {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.name())
  }
}

impl FromStr for HashAlgorithm {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    HashAlgorithm::ALL
      .into_iter()
      .find(|algorithm| algorithm.name().eq_ignore_ascii_case(s))
      .ok_or_else(|| format!("unknown hash algorithm '{}' (expected sha256, size or mtime)", s))
  }
}

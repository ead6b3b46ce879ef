//! File-based build-root locking for mutual exclusion.
//!
//! Every build (and `clean`) holds an exclusive advisory lock on
//! `<root>/.lock` so two processes never publish into the same root at once.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::LOCK_FILENAME;

#[derive(Debug, Serialize, Deserialize)]
pub struct LockMetadata {
  pub version: u32,
  pub pid: u32,
  pub started_at_unix: u64,
  pub command: String,
  pub root: PathBuf,
}

#[derive(Debug, Error)]
pub enum RootLockError {
  #[error(
    "build root is locked by another process: {command} (PID {pid}, started at Unix timestamp {started_at_unix})\n\
     If you're sure no stepwise process is running, remove the lock file:\n  {lock_path}"
  )]
  Contention {
    command: String,
    pid: u32,
    started_at_unix: u64,
    lock_path: PathBuf,
  },

  #[error(
    "build root is locked (could not read lock metadata)\n\
     If you're sure no stepwise process is running, remove the lock file:\n  {lock_path}"
  )]
  ContentionUnknown { lock_path: PathBuf },

  #[error("failed to create build root: {0}")]
  CreateDir(#[source] io::Error),

  #[error("failed to open lock file: {0}")]
  OpenFile(#[source] io::Error),

  #[error("failed to write lock metadata: {0}")]
  WriteMetadata(#[source] io::Error),

  #[error("failed to acquire lock: {0}")]
  LockFailed(#[source] io::Error),
}

/// An exclusive lock on a build root, released on drop.
#[derive(Debug)]
pub struct RootLock {
  file: File,
  lock_path: PathBuf,
}

impl RootLock {
  /// Take the lock on `root`, creating the directory if needed.
  ///
  /// Fails immediately with [`RootLockError::Contention`] if another process
  /// holds it.
  pub fn acquire(root: &Path, command: &str) -> Result<Self, RootLockError> {
    let lock_path = root.join(LOCK_FILENAME);

    if !root.exists() {
      std::fs::create_dir_all(root).map_err(RootLockError::CreateDir)?;
    }

    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&lock_path)
      .map_err(RootLockError::OpenFile)?;

    if let Err(err) = try_lock_exclusive(&file) {
      if err.kind() == io::ErrorKind::WouldBlock {
        return Err(Self::read_contention_error(&lock_path));
      }
      return Err(RootLockError::LockFailed(err));
    }

    Self::write_metadata(&file, command, root)?;
    debug!(path = %lock_path.display(), "acquired build root lock");

    Ok(RootLock { file, lock_path })
  }

  /// Reads the lock metadata through the held file handle.
  ///
  /// Opening a second handle would fail on Windows, where locks are mandatory.
  pub fn read_metadata(&self) -> io::Result<LockMetadata> {
    let mut file = &self.file;
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).map_err(io::Error::other)
  }

  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }

  fn write_metadata(file: &File, command: &str, root: &Path) -> Result<(), RootLockError> {
    let metadata = LockMetadata {
      version: 1,
      pid: std::process::id(),
      started_at_unix: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs(),
      command: command.to_string(),
      root: root.to_path_buf(),
    };

    file.set_len(0).map_err(RootLockError::WriteMetadata)?;
    let mut writer = io::BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &metadata)
      .map_err(|e| RootLockError::WriteMetadata(io::Error::other(e)))?;
    writer.flush().map_err(RootLockError::WriteMetadata)?;

    Ok(())
  }

  fn read_contention_error(lock_path: &Path) -> RootLockError {
    if let Ok(mut file) = File::open(lock_path) {
      let mut contents = String::new();
      if file.read_to_string(&mut contents).is_ok()
        && let Ok(metadata) = serde_json::from_str::<LockMetadata>(&contents)
      {
        return RootLockError::Contention {
          command: metadata.command,
          pid: metadata.pid,
          started_at_unix: metadata.started_at_unix,
          lock_path: lock_path.to_path_buf(),
        };
      }
    }

    RootLockError::ContentionUnknown {
      lock_path: lock_path.to_path_buf(),
    }
  }
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  flock(file.as_fd(), FlockOperation::NonBlockingLockExclusive)
    .map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(windows)]
fn try_lock_exclusive(file: &File) -> io::Result<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Foundation::HANDLE;
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx};

  let handle = file.as_raw_handle() as HANDLE;

  // SAFETY: OVERLAPPED is a plain data struct that is valid when zero-initialized,
  // and the handle stays open for the duration of the call.
  let result = unsafe {
    let mut overlapped = std::mem::zeroed();
    LockFileEx(
      handle,
      LOCKFILE_FAIL_IMMEDIATELY | LOCKFILE_EXCLUSIVE_LOCK,
      0,
      1,
      0,
      &mut overlapped,
    )
  };

  if result == 0 {
    Err(io::Error::last_os_error())
  } else {
    Ok(())
  }
}

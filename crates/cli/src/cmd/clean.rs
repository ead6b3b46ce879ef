//! Implementation of the `stepwise clean` command.

use std::fs;
use std::io;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;

use stepwise_lib::consts::LOCK_FILENAME;
use stepwise_lib::root_lock::RootLock;

use super::Settings;
use crate::output::{format_duration, print_json, print_skipped, print_stat, print_success};
use crate::prompts::confirm;

#[derive(Debug, Serialize)]
struct CleanReport {
  removed: bool,
  entries: usize,
}

pub fn cmd_clean(force: bool, settings: &Settings) -> Result<()> {
  let start = Instant::now();
  let root = &settings.root;

  if !root.exists() {
    if settings.output.is_json() {
      return print_json(&CleanReport {
        removed: false,
        entries: 0,
      });
    }
    print_skipped(&format!("Nothing to clean at {}", root.display()));
    return Ok(());
  }

  if !confirm(&format!("Remove build root {}?", root.display()), force)? {
    print_skipped("Aborted");
    return Ok(());
  }

  let lock = RootLock::acquire(root, "clean").context("Failed to acquire build root lock")?;

  let mut entries = 0;
  for entry in fs::read_dir(root).with_context(|| format!("Failed to read {}", root.display()))? {
    let entry = entry?;
    if entry.file_name() == LOCK_FILENAME {
      continue;
    }
    let path = entry.path();
    let removed = if entry.file_type()?.is_dir() {
      fs::remove_dir_all(&path)
    } else {
      fs::remove_file(&path)
    };
    removed.with_context(|| format!("Failed to remove {}", path.display()))?;
    entries += 1;
  }

  let lock_path = lock.lock_path().to_path_buf();
  drop(lock);
  match fs::remove_file(&lock_path) {
    Err(e) if e.kind() != io::ErrorKind::NotFound => {
      return Err(e).with_context(|| format!("Failed to remove {}", lock_path.display()));
    }
    _ => {}
  }
  fs::remove_dir(root).with_context(|| format!("Failed to remove {}", root.display()))?;

  if settings.output.is_json() {
    print_json(&CleanReport { removed: true, entries })?;
  } else {
    print_success(&format!("Removed {}", root.display()));
    print_stat("Entries", &entries.to_string());
    print_stat("Duration", &format_duration(start.elapsed()));
  }

  Ok(())
}

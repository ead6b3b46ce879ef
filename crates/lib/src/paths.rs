use std::path::PathBuf;

use crate::consts::{DEFAULT_ROOT_DIR, ROOT_ENV};

/// Returns the build root: `$STEPWISE_ROOT` if set, else `./.stepwise`.
pub fn default_root() -> PathBuf {
  match std::env::var_os(ROOT_ENV) {
    Some(root) if !root.is_empty() => PathBuf::from(root),
    _ => PathBuf::from(DEFAULT_ROOT_DIR),
  }
}

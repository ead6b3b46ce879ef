/// Overrides the default build root.
pub const ROOT_ENV: &str = "STEPWISE_ROOT";

/// Build root used when [`ROOT_ENV`] is unset, relative to the working directory.
pub const DEFAULT_ROOT_DIR: &str = ".stepwise";

pub const LOCK_FILENAME: &str = ".lock";

/// Per-identity directory holding the last published output.
pub const OUTPUT_DIR: &str = "output";

/// Per-identity directory holding persisted snapshots.
pub const CHECKSUM_DIR: &str = "checksum";

/// Snapshot of the published output. Dependency snapshots append `.<key>`.
pub const CHECKSUM_FILE: &str = "checksums";

/// Scratch directory handed to steps as their supplement folder.
pub const SUPPLEMENT_DIR: &str = "supplement";

/// Prefix of the per-run workspace created next to the published output.
pub const WORKSPACE_PREFIX: &str = ".next-";

mod build;
mod clean;
mod plan;

use std::path::PathBuf;

use stepwise_lib::{ExecuteConfig, HashAlgorithm};

use crate::output::OutputFormat;

pub use build::cmd_build;
pub use clean::cmd_clean;
pub use plan::cmd_plan;

/// Options shared by every command.
#[derive(Debug, Clone)]
pub struct Settings {
  pub root: PathBuf,
  pub hash: HashAlgorithm,
  pub jobs: Option<usize>,
  pub output: OutputFormat,
  pub verbose: bool,
}

impl Settings {
  pub fn execute_config(&self) -> ExecuteConfig {
    let config = ExecuteConfig::new(&self.root).with_hash(self.hash);
    match self.jobs {
      Some(jobs) => config.with_parallelism(jobs),
      None => config,
    }
  }
}

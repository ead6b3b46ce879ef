//! Shared fixtures for library integration tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use stepwise_lib::{Arguments, BuildEvent, ExecuteConfig, Step, StepContext, StepError, StepOutcome};
use tempfile::TempDir;

/// Reads `value` from every dependency in key order, appends a suffix and
/// writes the result to its own `value`.
pub struct Append(pub &'static str);

#[async_trait]
impl Step for Append {
  async fn apply(&self, context: &StepContext, arguments: &Arguments) -> Result<StepOutcome, StepError> {
    let mut value = String::new();
    for argument in arguments.values() {
      let file = argument.folder().join("value");
      if file.is_file() {
        value.push_str(&fs::read_to_string(file)?);
      }
    }
    value.push_str(self.0);
    fs::write(context.next().join("value"), value)?;
    Ok(StepOutcome::Produced)
  }
}

/// Writes a partial output, then fails.
pub struct FailAfterWrite;

#[async_trait]
impl Step for FailAfterWrite {
  fn always_run(&self) -> bool {
    true
  }

  async fn apply(&self, context: &StepContext, _: &Arguments) -> Result<StepOutcome, StepError> {
    fs::write(context.next().join("value"), "partial")?;
    Err("exploded halfway".into())
  }
}

/// Always asks to keep its previous output.
pub struct ReusePrevious;

#[async_trait]
impl Step for ReusePrevious {
  async fn apply(&self, _: &StepContext, _: &Arguments) -> Result<StepOutcome, StepError> {
    Ok(StepOutcome::ReusePrevious)
  }
}

/// Isolated build environment with one source folder.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  pub fn new() -> Self {
    let env = Self {
      temp: TempDir::new().unwrap(),
    };
    fs::create_dir_all(env.source()).unwrap();
    env
  }

  pub fn source(&self) -> PathBuf {
    self.temp.path().join("src")
  }

  pub fn root(&self) -> PathBuf {
    self.temp.path().join("root")
  }

  pub fn config(&self) -> ExecuteConfig {
    ExecuteConfig::new(self.root()).with_parallelism(4)
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
  }
}

pub fn read(path: &Path) -> String {
  fs::read_to_string(path).unwrap()
}

/// Collects every build event.
#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<BuildEvent>>>);

impl Recorder {
  pub fn attach(&self, config: ExecuteConfig) -> ExecuteConfig {
    let events = self.0.clone();
    config.with_listener(move |event: &BuildEvent| events.lock().unwrap().push(event.clone()))
  }

  pub fn events(&self) -> Vec<BuildEvent> {
    self.0.lock().unwrap().clone()
  }
}

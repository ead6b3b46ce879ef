//! Shell-command step.
//!
//! Runs one command through the platform shell inside the step's `next`
//! folder. The environment is cleared except for `PATH` and a fixed set of
//! variables:
//! - `out`, `previous`, `supplement`: the step's folders (`previous` is empty
//!   when there is no previous output)
//! - `HOME=/homeless-shelter`, `TMPDIR` and friends inside the supplement
//! - `LANG=C`, `LC_ALL=C`, `SOURCE_DATE_EPOCH=315532800`
//!
//! stdout and stderr are captured into `supplement/stdout.log` and
//! `supplement/stderr.log`.

use std::collections::BTreeMap;
use std::io;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::placeholder::{self, PlaceholderError, Resolver, Segment};
use crate::step::{Arguments, Step, StepContext, StepError, StepOutcome};

/// January 1, 1980 00:00:00 UTC (ZIP epoch).
const SOURCE_DATE_EPOCH: &str = "315532800";

#[derive(Debug, Error)]
pub enum ExecError {
  #[error(transparent)]
  Placeholder(#[from] PlaceholderError),

  #[error("failed to spawn {shell}: {source}")]
  Spawn {
    shell: String,
    #[source]
    source: io::Error,
  },

  #[error("command failed with exit code {code:?}: {command}{}", stderr_excerpt(.stderr))]
  Failed {
    command: String,
    code: Option<i32>,
    stderr: String,
  },

  #[error("io error: {0}")]
  Io(#[from] io::Error),
}

fn stderr_excerpt(stderr: &str) -> String {
  let trimmed = stderr.trim();
  if trimmed.is_empty() {
    String::new()
  } else {
    format!("\n{}", trimmed)
  }
}

/// A step that runs a shell command.
#[derive(Debug, Clone)]
pub struct ExecStep {
  command: Vec<Segment>,
  source: String,
  env: BTreeMap<String, Vec<Segment>>,
  shell: Option<String>,
  always_run: bool,
}

impl ExecStep {
  /// Parse `command`; placeholders are validated now and resolved per run.
  pub fn new(command: impl Into<String>) -> Result<Self, PlaceholderError> {
    let source = command.into();
    Ok(Self {
      command: placeholder::parse(&source)?,
      source,
      env: BTreeMap::new(),
      shell: None,
      always_run: false,
    })
  }

  /// Add an environment variable. The value may contain placeholders.
  pub fn with_env(mut self, key: impl Into<String>, value: &str) -> Result<Self, PlaceholderError> {
    self.env.insert(key.into(), placeholder::parse(value)?);
    Ok(self)
  }

  /// Use `shell` instead of the platform default.
  pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
    self.shell = Some(shell.into());
    self
  }

  /// Run on every build, even when nothing changed.
  pub fn with_always_run(mut self, always_run: bool) -> Self {
    self.always_run = always_run;
    self
  }

  pub fn command(&self) -> &str {
    &self.source
  }

  async fn run(&self, context: &StepContext, arguments: &Arguments) -> Result<(), ExecError> {
    let folders = Folders::new(context, arguments);
    let command = placeholder::substitute_segments(&self.command, &folders)?;
    let (shell, shell_args) = shell_invocation(self.shell.as_deref());

    let tmp = context.supplement().join("tmp");
    tokio::fs::create_dir_all(&tmp).await?;

    let mut process = Command::new(&shell);
    process
      .args(&shell_args)
      .arg(&command)
      .current_dir(context.next())
      .env_clear()
      .env("HOME", "/homeless-shelter")
      .env("TMPDIR", &tmp)
      .env("TMP", &tmp)
      .env("TEMP", &tmp)
      .env("out", &folders.out)
      .env("previous", &folders.previous)
      .env("supplement", &folders.supplement)
      .env("LANG", "C")
      .env("LC_ALL", "C")
      .env("SOURCE_DATE_EPOCH", SOURCE_DATE_EPOCH);
    if let Some(path) = std::env::var_os("PATH") {
      process.env("PATH", path);
    }
    if cfg!(windows)
      && let Some(root) = std::env::var_os("SYSTEMROOT")
    {
      process.env("SYSTEMROOT", root);
    }
    for (key, value) in &self.env {
      process.env(key, placeholder::substitute_segments(value, &folders)?);
    }

    info!(command = %command, "running command");
    debug!(shell = %shell, cwd = %context.next().display(), "spawning process");

    let output = process.output().await.map_err(|source| ExecError::Spawn {
      shell: shell.clone(),
      source,
    })?;

    tokio::fs::write(context.supplement().join("stdout.log"), &output.stdout).await?;
    tokio::fs::write(context.supplement().join("stderr.log"), &output.stderr).await?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
      debug!(stderr = %stderr, "command stderr");
      return Err(ExecError::Failed {
        command,
        code: output.status.code(),
        stderr,
      });
    }

    Ok(())
  }
}

#[async_trait]
impl Step for ExecStep {
  fn always_run(&self) -> bool {
    self.always_run
  }

  async fn apply(&self, context: &StepContext, arguments: &Arguments) -> Result<StepOutcome, StepError> {
    self.run(context, arguments).await?;
    Ok(StepOutcome::Produced)
  }
}

/// Folder paths of a running step, rendered for the shell.
struct Folders {
  out: String,
  previous: String,
  supplement: String,
  dependencies: BTreeMap<String, String>,
}

impl Folders {
  fn new(context: &StepContext, arguments: &Arguments) -> Self {
    Self {
      out: context.next().to_string_lossy().into_owned(),
      previous: context
        .previous()
        .map(|path| path.to_string_lossy().into_owned())
        .unwrap_or_default(),
      supplement: context.supplement().to_string_lossy().into_owned(),
      dependencies: arguments
        .iter()
        .map(|(key, argument)| (key.clone(), argument.folder().to_string_lossy().into_owned()))
        .collect(),
    }
  }
}

impl Resolver for Folders {
  fn resolve_out(&self) -> Result<&str, PlaceholderError> {
    Ok(&self.out)
  }

  fn resolve_previous(&self) -> Result<&str, PlaceholderError> {
    Ok(&self.previous)
  }

  fn resolve_supplement(&self) -> Result<&str, PlaceholderError> {
    Ok(&self.supplement)
  }

  fn resolve_dependency(&self, key: &str) -> Result<&str, PlaceholderError> {
    self
      .dependencies
      .get(key)
      .map(String::as_str)
      .ok_or_else(|| PlaceholderError::UnresolvedDependency(key.to_string()))
  }
}

/// Shell binary and the arguments preceding the command.
///
/// Defaults to `/bin/sh` (Unix) or PowerShell (Windows) rather than `$SHELL`,
/// which may source user profiles.
fn shell_invocation(shell: Option<&str>) -> (String, Vec<String>) {
  if let Some(shell) = shell {
    let args = if shell.contains("powershell") || shell.contains("pwsh") {
      vec!["-NoProfile".to_string(), "-Command".to_string()]
    } else if shell.contains("cmd") {
      vec!["/C".to_string()]
    } else {
      vec!["-c".to_string()]
    };
    return (shell.to_string(), args);
  }

  #[cfg(unix)]
  {
    ("/bin/sh".to_string(), vec!["-c".to_string()])
  }

  #[cfg(windows)]
  {
    (
      "powershell.exe".to_string(),
      vec![
        "-NoProfile".to_string(),
        "-ExecutionPolicy".to_string(),
        "Bypass".to_string(),
        "-Command".to_string(),
      ],
    )
  }
}

use anyhow::{Result, bail};
use std::io::{self, IsTerminal, Write};

/// Ask a yes/no question on stderr. `force` answers yes without asking.
pub fn confirm(question: &str, force: bool) -> Result<bool> {
  if force {
    return Ok(true);
  }

  if !io::stdin().is_terminal() || !io::stderr().is_terminal() {
    bail!("Refusing to prompt in non-interactive mode. Pass --force to proceed.");
  }

  let mut stderr = io::stderr();
  write!(stderr, "{} [y/N] ", question)?;
  stderr.flush()?;

  let mut answer = String::new();
  io::stdin().read_line(&mut answer)?;

  Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

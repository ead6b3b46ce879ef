mod cmd;
mod output;
mod prompts;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use stepwise_lib::HashAlgorithm;
use stepwise_lib::paths::default_root;
use tracing_subscriber::EnvFilter;

use crate::cmd::{Settings, cmd_build, cmd_clean, cmd_plan};
use crate::output::{OutputFormat, print_error};

/// Incremental build-graph executor
#[derive(Parser)]
#[command(name = "stepwise")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Build root holding published outputs (default: $STEPWISE_ROOT or ./.stepwise)
  #[arg(long, global = true)]
  root: Option<PathBuf>,

  /// Fingerprint function: sha256, size or mtime
  #[arg(long, global = true, default_value_t = HashAlgorithm::Sha256)]
  hash: HashAlgorithm,

  /// Maximum number of nodes running at once (default: number of CPUs)
  #[arg(short, long, global = true)]
  jobs: Option<usize>,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
  output: OutputFormat,

  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Execute a graph file, rerunning only what changed
  Build {
    /// Path to the graph file
    #[arg(default_value = "graph.json")]
    graph: PathBuf,
  },

  /// Show the execution waves of a graph file without building
  Plan {
    /// Path to the graph file
    #[arg(default_value = "graph.json")]
    graph: PathBuf,
  },

  /// Remove the build root and everything published in it
  Clean {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    force: bool,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_env("STEPWISE_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let settings = Settings {
    root: cli.root.unwrap_or_else(default_root),
    hash: cli.hash,
    jobs: cli.jobs,
    output: cli.output,
    verbose: cli.verbose,
  };

  let result = match cli.command {
    Commands::Build { graph } => cmd_build(&graph, &settings),
    Commands::Plan { graph } => cmd_plan(&graph, &settings),
    Commands::Clean { force } => cmd_clean(force, &settings),
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      print_error(&format!("{:#}", err));
      ExitCode::FAILURE
    }
  }
}

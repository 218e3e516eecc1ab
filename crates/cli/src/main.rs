mod cmd;
mod load;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use iceforge_lib::consts::{EXIT_BUILD_FAILED, EXIT_CONFIG_ERROR, MANIFEST_FILENAME};
use iceforge_lib::error::EngineError;

use crate::cmd::{BuildArgs, cmd_build, cmd_clean, cmd_refresh, cmd_run};
use crate::load::LoadError;
use crate::output::{OutputFormat, print_error};

/// iceforge - build orchestration for multi-subproject C projects
#[derive(Parser)]
#[command(name = "iceforge")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Path to the project manifest
  #[arg(short, long, global = true, default_value = MANIFEST_FILENAME)]
  manifest: PathBuf,

  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build the project, or one subproject and what it depends on
  Build {
    /// Use the release profile
    #[arg(long)]
    release: bool,

    /// Build only this subproject
    #[arg(short, long)]
    subproject: Option<String>,

    /// Maximum number of commands running at once (default: ICEFORGE_JOBS, then the manifest)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Run this on-trigger custom build rule (repeatable)
    #[arg(short, long = "trigger", value_name = "RULE")]
    triggers: Vec<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
  },

  /// Re-fetch every remote dependency
  Refresh,

  /// Remove build outputs and the fingerprint cache
  Clean {
    /// Also remove remote dependency checkouts
    #[arg(long)]
    all: bool,
  },

  /// Build a binary subproject, then run it
  Run {
    /// Use the release profile
    #[arg(long)]
    release: bool,

    /// Binary subproject to run (default: the only one declared)
    #[arg(short, long)]
    binary: Option<String>,

    /// Arguments passed to the binary
    #[arg(last = true)]
    args: Vec<String>,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  let result = match cli.command {
    Commands::Build {
      release,
      subproject,
      jobs,
      triggers,
      output,
    } => cmd_build(
      &cli.manifest,
      BuildArgs {
        release,
        subproject,
        jobs,
        triggers,
        output,
      },
    ),
    Commands::Refresh => cmd_refresh(&cli.manifest),
    Commands::Clean { all } => cmd_clean(&cli.manifest, all),
    Commands::Run { release, binary, args } => cmd_run(&cli.manifest, release, binary, &args),
  };

  match result {
    Ok(code) => exit_code(code),
    Err(err) => {
      print_error(&format!("{err:#}"));
      exit_code(status_of(&err))
    }
  }
}

fn init_logging(verbose: bool) {
  let default = if verbose {
    "iceforge=info,iceforge_lib=info"
  } else {
    "warn"
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

/// Pre-execution problems get their own status so scripts can tell a bad
/// manifest from a failed compile.
fn status_of(err: &anyhow::Error) -> i32 {
  if let Some(engine) = err.downcast_ref::<EngineError>() {
    engine.exit_code()
  } else if err.downcast_ref::<LoadError>().is_some() {
    EXIT_CONFIG_ERROR
  } else {
    EXIT_BUILD_FAILED
  }
}

fn exit_code(code: i32) -> ExitCode {
  ExitCode::from(u8::try_from(code).unwrap_or(1))
}

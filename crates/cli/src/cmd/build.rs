//! Implementation of the `iceforge build` command.

use std::env;
use std::path::Path;
use std::time::Instant;

use anyhow::Result;

use iceforge_lib::consts::JOBS_ENV;
use iceforge_lib::engine::{BuildOptions, Engine};
use iceforge_lib::project::Profile;

use super::block_on_cancellable;
use crate::load::{LoadError, load_project};
use crate::output::{OutputFormat, print_report};

pub struct BuildArgs {
  pub release: bool,
  pub subproject: Option<String>,
  pub jobs: Option<usize>,
  pub triggers: Vec<String>,
  pub output: OutputFormat,
}

/// Execute the build command.
///
/// Loads the manifest next to `manifest`, builds everything stale and prints
/// the report. Returns the process exit status: 0 when every node built or
/// was up to date, 1 when any failed, 130 when interrupted.
pub fn cmd_build(manifest: &Path, args: BuildArgs) -> Result<i32> {
  let start = Instant::now();
  let project = load_project(manifest)?;

  let options = BuildOptions {
    profile: profile_for(args.release),
    jobs: jobs_or_env(args.jobs)?,
    subproject: args.subproject,
    triggers: args.triggers.into_iter().collect(),
    ..Default::default()
  };

  let engine = Engine::default();
  let report = block_on_cancellable(&options.cancel, engine.build(&project, &options))??;

  print_report(&report, start.elapsed(), args.output)?;
  Ok(report.exit_code())
}

pub(super) fn profile_for(release: bool) -> Profile {
  if release { Profile::Release } else { Profile::Debug }
}

/// `--jobs` wins; otherwise `ICEFORGE_JOBS` if set.
fn jobs_or_env(explicit: Option<usize>) -> Result<Option<usize>, LoadError> {
  if explicit.is_some() {
    return Ok(explicit);
  }
  match env::var(JOBS_ENV) {
    Ok(value) => match value.trim().parse::<usize>() {
      Ok(jobs) => Ok(Some(jobs)),
      Err(source) => Err(LoadError::Jobs { value, source }),
    },
    Err(_) => Ok(None),
  }
}

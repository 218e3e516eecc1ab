//! Implementation of the `iceforge run` command.

use std::path::Path;
use std::process::Command;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use tracing::info;

use iceforge_lib::consts::EXIT_BUILD_FAILED;
use iceforge_lib::engine::{BuildOptions, Engine};
use iceforge_lib::error::{EngineError, ResolutionError};
use iceforge_lib::manifest::SubprojectKind;
use iceforge_lib::project::{Project, Subproject};

use super::block_on_cancellable;
use super::build::profile_for;
use crate::load::load_project;
use crate::output::{OutputFormat, print_report};

/// Execute the run command.
///
/// Builds the chosen binary subproject and what it links against, then runs
/// it from the project root. Returns the binary's exit status, or the build's
/// if the build did not succeed.
pub fn cmd_run(manifest: &Path, release: bool, binary: Option<String>, args: &[String]) -> Result<i32> {
  let start = Instant::now();
  let project = load_project(manifest)?;
  let target = pick_binary(&project, binary.as_deref())?;
  let profile = profile_for(release);

  let options = BuildOptions {
    profile,
    subproject: Some(target.name.clone()),
    ..Default::default()
  };
  let engine = Engine::default();
  let report = block_on_cancellable(&options.cancel, engine.build(&project, &options))??;
  if !report.is_success() {
    print_report(&report, start.elapsed(), OutputFormat::Text)?;
    return Ok(report.exit_code());
  }

  let Some(path) = project.artifact_path(target, profile) else {
    bail!("subproject `{}` produces no executable", target.name);
  };
  info!(binary = %path.display(), "running");
  let status = Command::new(&path)
    .args(args)
    .current_dir(&project.root)
    .status()
    .with_context(|| format!("Failed to run {}", path.display()))?;

  Ok(status.code().unwrap_or(EXIT_BUILD_FAILED))
}

fn pick_binary<'a>(project: &'a Project, name: Option<&str>) -> Result<&'a Subproject> {
  let binaries: Vec<&Subproject> = project
    .subprojects
    .iter()
    .filter(|s| s.kind == SubprojectKind::Binary)
    .collect();

  match name {
    Some(name) => match binaries.into_iter().find(|s| s.name == name) {
      Some(found) => Ok(found),
      None => Err(EngineError::from(ResolutionError::UnknownSubproject { name: name.to_string() }).into()),
    },
    None => match binaries.as_slice() {
      [only] => Ok(only),
      [] => bail!("the manifest declares no binary subprojects"),
      several => {
        let names: Vec<&str> = several.iter().map(|s| s.name.as_str()).collect();
        bail!("several binaries are declared ({}); pick one with --binary", names.join(", "))
      }
    },
  }
}

//! Implementation of the `iceforge clean` command.

use std::path::Path;

use anyhow::{Context, Result};

use iceforge_lib::consts::EXIT_SUCCESS;
use iceforge_lib::engine::clean;

use crate::load::load_project;
use crate::output::{print_info, print_stat, print_success};

/// Remove profile output directories and the fingerprint store; with `all`,
/// dependency checkouts too.
pub fn cmd_clean(manifest: &Path, all: bool) -> Result<i32> {
  let project = load_project(manifest)?;
  let removed = clean(&project, all).context("Failed to remove build outputs")?;

  if removed.is_empty() {
    print_info("Nothing to clean");
    return Ok(EXIT_SUCCESS);
  }

  print_success("Clean complete");
  for path in &removed {
    let shown = path.strip_prefix(&project.root).unwrap_or(path);
    print_stat("Removed", &shown.display().to_string());
  }
  Ok(EXIT_SUCCESS)
}

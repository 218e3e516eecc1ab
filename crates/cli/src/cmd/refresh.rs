//! Implementation of the `iceforge refresh` command.
//!
//! Re-fetches every remote dependency regardless of what is checked out.
//! Nothing is compiled; the next build picks up the new checkouts.

use std::path::Path;
use std::time::Instant;

use anyhow::Result;

use iceforge_lib::engine::Engine;
use iceforge_lib::execute::CancelFlag;

use super::block_on_cancellable;
use crate::load::load_project;
use crate::output::{OutputFormat, print_info, print_report};

pub fn cmd_refresh(manifest: &Path) -> Result<i32> {
  let start = Instant::now();
  let project = load_project(manifest)?;

  let cancel = CancelFlag::new();
  let engine = Engine::default();
  let report = block_on_cancellable(&cancel, engine.refresh(&project, cancel.clone()))??;

  if report.total() == 0 {
    print_info("No remote dependencies to refresh");
    return Ok(report.exit_code());
  }
  print_report(&report, start.elapsed(), OutputFormat::Text)?;
  Ok(report.exit_code())
}

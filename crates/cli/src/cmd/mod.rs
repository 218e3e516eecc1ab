mod build;
mod clean;
mod refresh;
mod run;

use std::future::Future;

use anyhow::{Context, Result};
use tracing::warn;

use iceforge_lib::execute::CancelFlag;

pub use build::{BuildArgs, cmd_build};
pub use clean::cmd_clean;
pub use refresh::cmd_refresh;
pub use run::cmd_run;

/// Drive `future` on a fresh runtime. Ctrl-C sets `cancel`, letting running
/// commands finish while nothing new starts.
fn block_on_cancellable<F: Future>(cancel: &CancelFlag, future: F) -> Result<F::Output> {
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let flag = cancel.clone();

  Ok(rt.block_on(async move {
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        warn!("interrupt received, waiting for running commands to finish");
        flag.cancel();
      }
    });
    future.await
  }))
}

//! External process execution.

use std::io;
use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::graph::Invocation;

/// Captured result of one external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
  /// `None` when the process was terminated by a signal.
  pub exit_code: Option<i32>,
  pub stdout: String,
  pub stderr: String,
}

impl ProcessOutput {
  pub fn success(&self) -> bool {
    self.exit_code == Some(0)
  }
}

/// Runs compile, archive, link, rule and dependency-build commands.
///
/// Called from the blocking pool; implementations may block until the
/// process exits.
pub trait ProcessExecutor: Send + Sync {
  /// # Errors
  ///
  /// Returns an I/O error only when the process could not be spawned. A
  /// process that runs and exits nonzero is reported through
  /// [`ProcessOutput::exit_code`].
  fn execute(&self, invocation: &Invocation, workdir: &Path) -> io::Result<ProcessOutput>;
}

/// Spawns real processes. Shell invocations go through the platform shell.
#[derive(Debug, Clone, Default)]
pub struct ShellExecutor;

impl ProcessExecutor for ShellExecutor {
  fn execute(&self, invocation: &Invocation, workdir: &Path) -> io::Result<ProcessOutput> {
    let mut command = match invocation {
      Invocation::Exec { program, args } => {
        let mut command = Command::new(program);
        command.args(args);
        command
      }
      Invocation::Shell(line) => {
        let (shell, flag) = platform_shell();
        let mut command = Command::new(shell);
        command.arg(flag).arg(line);
        command
      }
    };

    debug!(command = %invocation, workdir = %workdir.display(), "spawning process");
    let output = command.current_dir(workdir).output()?;

    Ok(ProcessOutput {
      exit_code: output.status.code(),
      stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
      stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
  }
}

/// `/bin/sh -c` on Unix, `cmd /C` on Windows.
fn platform_shell() -> (&'static str, &'static str) {
  #[cfg(windows)]
  {
    ("cmd", "/C")
  }

  #[cfg(not(windows))]
  {
    ("/bin/sh", "-c")
  }
}

/// The last `lines` lines of `text`, for failure reports.
pub fn tail(text: &str, lines: usize) -> String {
  let all: Vec<&str> = text.trim_end().lines().collect();
  all[all.len().saturating_sub(lines)..].join("\n")
}

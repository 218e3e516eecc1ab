//! System package flag queries.

use std::process::Command;

use tracing::debug;

use super::fetch::FetchError;

/// Compile and link flags reported for a system package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageFlags {
  pub cflags: Vec<String>,
  pub ldflags: Vec<String>,
}

/// A `pkg-config`-like lookup.
pub trait PackageQuery: Send + Sync {
  /// # Errors
  ///
  /// [`FetchError::PackageNotFound`] if the package is unknown to the system.
  fn query(&self, query: &str) -> Result<PackageFlags, FetchError>;
}

/// [`PackageQuery`] that shells out to `pkg-config`.
#[derive(Debug, Clone)]
pub struct PkgConfig {
  program: String,
}

impl Default for PkgConfig {
  fn default() -> Self {
    Self {
      program: "pkg-config".to_string(),
    }
  }
}

impl PkgConfig {
  pub fn with_program(program: impl Into<String>) -> Self {
    Self { program: program.into() }
  }

  fn run(&self, flag: &str, query: &str) -> Result<Vec<String>, FetchError> {
    let output = Command::new(&self.program)
      .arg(flag)
      .args(query.split_whitespace())
      .output()
      .map_err(|e| FetchError::Spawn {
        program: self.program.clone(),
        source: e,
      })?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
      return Err(FetchError::PackageNotFound {
        query: query.to_string(),
        message: if stderr.is_empty() {
          format!("{} exited with {:?}", self.program, output.status.code())
        } else {
          stderr
        },
      });
    }

    Ok(
      String::from_utf8_lossy(&output.stdout)
        .split_whitespace()
        .map(str::to_string)
        .collect(),
    )
  }
}

impl PackageQuery for PkgConfig {
  fn query(&self, query: &str) -> Result<PackageFlags, FetchError> {
    let cflags = self.run("--cflags", query)?;
    let ldflags = self.run("--libs", query)?;
    debug!(query, ?cflags, ?ldflags, "package flags");
    Ok(PackageFlags { cflags, ldflags })
  }
}

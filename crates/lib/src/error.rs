//! Pre-execution error taxonomy.
//!
//! [`ConfigError`] and [`ResolutionError`] abort a build before anything is
//! scheduled. Failures that happen while nodes run are not errors at this
//! level: they are collected into [`crate::execute::BuildReport`].

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::consts::{EXIT_BUILD_FAILED, EXIT_CONFIG_ERROR};
use crate::stale::StoreError;
use crate::template::TemplateError;

/// A single manifest validation problem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
  #[error("missing [build] section")]
  MissingBuildSection,

  #[error("{entity}: missing required field `{field}`")]
  MissingField { entity: String, field: &'static str },

  #[error("{entity}: name must not be empty")]
  EmptyName { entity: String },

  #[error("name `{name}` is declared more than once ({first} and {second})")]
  DuplicateName { name: String, first: String, second: String },

  #[error("subproject `{subproject}` depends on unknown name `{reference}`")]
  UnknownReference { subproject: String, reference: String },

  #[error("override targets unknown subproject `{target}`")]
  UnknownOverrideTarget { target: String },

  #[error("subproject `{target}` has more than one override")]
  DuplicateOverride { target: String },

  #[error("custom build rule `{name}` is declared more than once")]
  DuplicateRule { name: String },

  #[error("custom build rule `{rule}` has no trigger extensions")]
  NoTriggerExtensions { rule: String },

  #[error("custom build rule `{rule}`: {source}")]
  InvalidTemplate {
    rule: String,
    #[source]
    source: TemplateError,
  },

  #[error("{entity}: parallel_jobs must be at least 1")]
  ZeroJobs { entity: String },

  #[error("remote dependencies `{first}` and `{second}` both fetch {source_url} at the same version")]
  DuplicateRemote {
    first: String,
    second: String,
    source_url: String,
  },

  #[error("include_name `{include_name}` is used by more than one remote dependency")]
  DuplicateIncludeName { include_name: String },
}

/// The manifest was rejected. Lists every violation found, not just the first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
  pub violations: Vec<Violation>,
}

impl fmt::Display for ConfigError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let count = self.violations.len();
    write!(
      f,
      "invalid manifest: {count} problem{}",
      if count == 1 { "" } else { "s" }
    )?;
    for violation in &self.violations {
      write!(f, "\n  - {violation}")?;
    }
    Ok(())
  }
}

impl std::error::Error for ConfigError {}

/// The manifest is valid but cannot be turned into a build graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
  /// Rendered as `a -> b -> a`.
  #[error("dependency cycle: {}", .cycle.join(" -> "))]
  Cycle { cycle: Vec<String> },

  #[error(
    "subproject `{subproject}` references `{reference}`, a component inside `{dependency}`, which the manifest does not declare"
  )]
  UnresolvedComponent {
    subproject: String,
    reference: String,
    dependency: String,
  },

  #[error("remote dependency `{dependency}` uses build_method = \"custom\" but has no build_command")]
  MissingBuildCommand { dependency: String },

  #[error("unknown subproject `{name}`")]
  UnknownSubproject { name: String },

  #[error("failed to scan {}: {message}", .path.display())]
  Scan { path: PathBuf, message: String },
}

/// Everything that can stop the engine before or after scheduling.
#[derive(Debug, Error)]
pub enum EngineError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Resolution(#[from] ResolutionError),

  #[error("fingerprint store: {0}")]
  Store(#[from] StoreError),

  #[error("io error: {0}")]
  Io(#[from] io::Error),
}

impl EngineError {
  /// Process exit status for this error.
  ///
  /// Manifest and resolution problems use a status distinct from execution
  /// failures so tooling can tell a bad manifest from a compile error.
  pub fn exit_code(&self) -> i32 {
    match self {
      EngineError::Config(_) | EngineError::Resolution(_) => EXIT_CONFIG_ERROR,
      EngineError::Store(_) | EngineError::Io(_) => EXIT_BUILD_FAILED,
    }
  }
}

//! Build graph node types.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::deps::{DependencyBuild, FetchStep};
use crate::template::shell_quote;

/// Stable node identity, persisted as the fingerprint store key.
///
/// Formatted `<kind>:<owner>[:<path>]`, e.g. `compile:core:a.c`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for NodeId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for NodeId {
  fn from(s: &str) -> Self {
    NodeId(s.to_string())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnitKind {
  Compile,
  Archive,
  Link,
  CustomRule,
  Fetch,
  DependencyBuild,
  FlagOnly,
}

impl UnitKind {
  pub fn as_str(self) -> &'static str {
    match self {
      UnitKind::Compile => "compile",
      UnitKind::Archive => "archive",
      UnitKind::Link => "link",
      UnitKind::CustomRule => "rule",
      UnitKind::Fetch => "fetch",
      UnitKind::DependencyBuild => "dep-build",
      UnitKind::FlagOnly => "flags",
    }
  }
}

impl fmt::Display for UnitKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// An external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
  /// Program and arguments, run without a shell.
  Exec { program: String, args: Vec<String> },
  /// A command line handed to the platform shell.
  Shell(String),
}

impl fmt::Display for Invocation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Invocation::Exec { program, args } => {
        write!(f, "{}", shell_quote(program))?;
        for arg in args {
          write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
      }
      Invocation::Shell(command) => f.write_str(command),
    }
  }
}

/// What running a node means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
  Run { invocation: Invocation, workdir: PathBuf },
  Fetch(FetchStep),
  /// Flag-only nodes. `failure` is set when the flags could not be obtained.
  Flags { summary: String, failure: Option<String> },
}

impl Action {
  /// The resolved command line, as fed into fingerprints and failure reports.
  pub fn describe(&self) -> String {
    match self {
      Action::Run { invocation, .. } => invocation.to_string(),
      Action::Fetch(step) => format!("fetch {} @ {}", step.source, step.version.as_deref().unwrap_or("HEAD")),
      Action::Flags { summary, .. } => summary.clone(),
    }
  }

  pub(crate) fn dependency_build(build: &DependencyBuild, checkout: PathBuf) -> Self {
    Action::Run {
      invocation: Invocation::Shell(build.command.clone()),
      workdir: checkout,
    }
  }
}

/// Which concurrency limit a node runs under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
  Global,
  /// A subproject with its own `parallel_jobs` override.
  Capped { subproject: String, jobs: usize },
}

/// How staleness is decided for a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildPolicy {
  Fingerprint,
  Always,
  /// Runs only when the named rule is in the caller's trigger set.
  OnTrigger(String),
}

/// One schedulable action in the build graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildUnit {
  pub id: NodeId,
  pub kind: UnitKind,
  /// Subproject or rule that owns the node, for logs and filters.
  pub owner: String,
  pub scope: Scope,
  /// Files whose contents feed the fingerprint.
  pub inputs: Vec<PathBuf>,
  /// Directories scanned for headers when fingerprinting.
  pub header_dirs: Vec<PathBuf>,
  pub outputs: Vec<PathBuf>,
  pub action: Action,
  pub rebuild: RebuildPolicy,
}

//! Scheduler configuration and report types.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::consts::{EXIT_BUILD_FAILED, EXIT_INTERRUPTED, EXIT_SUCCESS};
use crate::graph::{NodeId, UnitKind};

/// Shared interrupt flag. Once set, the scheduler dispatches nothing new.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}

/// Scheduler configuration for one run.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Global job cap, for nodes whose subproject has no override cap.
  pub jobs: usize,
  /// Rules with `rebuild_rule = "on-trigger"` to run.
  pub triggers: BTreeSet<String>,
  /// Re-fetch remote dependencies even when their checkout is current.
  pub force_fetch: bool,
  pub cancel: CancelFlag,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      jobs: default_jobs(),
      triggers: BTreeSet::new(),
      force_fetch: false,
      cancel: CancelFlag::new(),
    }
  }
}

/// Available parallelism, or 4 if it cannot be determined.
pub fn default_jobs() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}

/// Coarse classification of a failed node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
  Fetch,
  Compile,
  /// Link or archive.
  Link,
  CustomRule,
  DependencyBuild,
}

impl From<UnitKind> for FailureKind {
  fn from(kind: UnitKind) -> Self {
    match kind {
      UnitKind::Compile => FailureKind::Compile,
      UnitKind::Archive | UnitKind::Link => FailureKind::Link,
      UnitKind::CustomRule => FailureKind::CustomRule,
      UnitKind::DependencyBuild => FailureKind::DependencyBuild,
      UnitKind::Fetch | UnitKind::FlagOnly => FailureKind::Fetch,
    }
  }
}

impl fmt::Display for FailureKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      FailureKind::Fetch => "fetch",
      FailureKind::Compile => "compile",
      FailureKind::Link => "link",
      FailureKind::CustomRule => "custom rule",
      FailureKind::DependencyBuild => "dependency build",
    };
    f.write_str(s)
  }
}

/// A node that ran, or tried to, and did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFailure {
  pub node: NodeId,
  pub kind: FailureKind,
  /// The resolved command line.
  pub command: String,
  /// `None` if the process never started or was killed by a signal.
  pub exit_code: Option<i32>,
  /// Tail of stderr, or the spawn/fetch error.
  pub message: String,
}

/// Why a node never ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipCause {
  /// A predecessor failed or was itself skipped; names the failed root.
  FailedDependency(NodeId),
  Cancelled,
}

impl fmt::Display for SkipCause {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SkipCause::FailedDependency(id) => write!(f, "dependency {id} failed"),
      SkipCause::Cancelled => f.write_str("cancelled"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedNode {
  pub node: NodeId,
  pub cause: SkipCause,
}

/// Terminal state of every node in one run.
///
/// `succeeded` lists nodes that actually executed; `up_to_date` lists nodes
/// whose fingerprint matched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
  pub succeeded: Vec<NodeId>,
  pub up_to_date: Vec<NodeId>,
  pub failed: Vec<NodeFailure>,
  pub skipped: Vec<SkippedNode>,
  pub cancelled: bool,
}

impl BuildReport {
  pub fn is_success(&self) -> bool {
    self.failed.is_empty() && !self.cancelled
  }

  /// Number of nodes accounted for.
  pub fn total(&self) -> usize {
    self.succeeded.len() + self.up_to_date.len() + self.failed.len() + self.skipped.len()
  }

  pub fn exit_code(&self) -> i32 {
    if self.cancelled {
      EXIT_INTERRUPTED
    } else if self.failed.is_empty() {
      EXIT_SUCCESS
    } else {
      EXIT_BUILD_FAILED
    }
  }

  pub fn failure(&self, node: &str) -> Option<&NodeFailure> {
    self.failed.iter().find(|f| f.node.as_str() == node)
  }

  pub fn skip_cause(&self, node: &str) -> Option<&SkipCause> {
    self.skipped.iter().find(|s| s.node.as_str() == node).map(|s| &s.cause)
  }
}

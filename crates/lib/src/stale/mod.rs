//! Staleness Engine.
//!
//! A node's fingerprint covers:
//! - the content digest of every input file
//! - the content digest of every header in the node's header directories
//! - the resolved command line, overrides and all
//! - the fingerprints of its direct predecessors
//!
//! Content digests rather than modification times keep fingerprints stable
//! across fresh clones. Because predecessor fingerprints are folded in, a
//! changed source invalidates everything downstream of its compile node and
//! nothing else.

mod store;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use walkdir::WalkDir;

use crate::consts::HEADER_EXTENSIONS;
use crate::graph::{BuildUnit, NodeId, RebuildPolicy, UnitKind};
use crate::util::hash::{ContentHash, FieldHasher, hash_file};

pub use store::{FingerprintRecord, FingerprintStore, STORE_VERSION, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
  /// `rebuild_rule = "always"`.
  Always,
  /// An `on-trigger` rule named in the trigger set.
  Triggered,
  /// `refresh` forces every fetch.
  Refresh,
  NoRecord,
  Changed,
  MissingOutput(PathBuf),
}

impl fmt::Display for StaleReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      StaleReason::Always => f.write_str("always rebuilt"),
      StaleReason::Triggered => f.write_str("triggered"),
      StaleReason::Refresh => f.write_str("refresh requested"),
      StaleReason::NoRecord => f.write_str("never built"),
      StaleReason::Changed => f.write_str("fingerprint changed"),
      StaleReason::MissingOutput(path) => write!(f, "missing output {}", path.display()),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
  UpToDate,
  Stale(StaleReason),
}

impl Staleness {
  pub fn is_stale(&self) -> bool {
    matches!(self, Staleness::Stale(_))
  }
}

/// Caller-supplied knobs that bypass the fingerprint comparison.
#[derive(Debug, Clone, Default)]
pub struct StalenessPolicy {
  /// Rules with `rebuild_rule = "on-trigger"` that should run this time.
  pub triggers: BTreeSet<String>,
  /// Treat every fetch node as stale.
  pub force_fetch: bool,
}

impl StalenessPolicy {
  /// Decide whether `unit` needs to run.
  ///
  /// # Arguments
  ///
  /// * `unit` - The node being assessed
  /// * `fingerprint` - Its fingerprint for this invocation
  /// * `recorded` - What the store holds for it, if anything
  pub fn assess(&self, unit: &BuildUnit, fingerprint: &ContentHash, recorded: Option<&FingerprintRecord>) -> Staleness {
    match &unit.rebuild {
      RebuildPolicy::Always => return Staleness::Stale(StaleReason::Always),
      RebuildPolicy::OnTrigger(rule) => {
        return if self.triggers.contains(rule) {
          Staleness::Stale(StaleReason::Triggered)
        } else {
          Staleness::UpToDate
        };
      }
      RebuildPolicy::Fingerprint => {}
    }

    if unit.kind == UnitKind::Fetch && self.force_fetch {
      return Staleness::Stale(StaleReason::Refresh);
    }

    let Some(recorded) = recorded else {
      return Staleness::Stale(StaleReason::NoRecord);
    };
    if &recorded.fingerprint != fingerprint {
      return Staleness::Stale(StaleReason::Changed);
    }
    if let Some(missing) = unit.outputs.iter().find(|output| !output.exists()) {
      return Staleness::Stale(StaleReason::MissingOutput(missing.clone()));
    }
    Staleness::UpToDate
  }
}

/// File digests and header listings memoized for one build.
///
/// Every compile node of a subproject scans the same header directories, so
/// each directory is walked and each header hashed at most once.
#[derive(Debug, Default)]
pub struct DigestCache {
  files: Mutex<HashMap<PathBuf, Option<ContentHash>>>,
  headers: Mutex<HashMap<PathBuf, Vec<PathBuf>>>,
}

impl DigestCache {
  pub fn new() -> Self {
    Self::default()
  }

  /// Content digest of `path`, or `None` if it cannot be read.
  pub fn digest(&self, path: &Path) -> Option<ContentHash> {
    if let Some(hit) = self.files.lock().unwrap_or_else(PoisonError::into_inner).get(path) {
      return hit.clone();
    }
    let digest = hash_file(path).ok();
    self
      .files
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(path.to_path_buf(), digest.clone());
    digest
  }

  /// Header files under `dir`, sorted. Empty if the directory does not exist.
  pub fn headers(&self, dir: &Path) -> Vec<PathBuf> {
    if let Some(hit) = self.headers.lock().unwrap_or_else(PoisonError::into_inner).get(dir) {
      return hit.clone();
    }
    let found: Vec<PathBuf> = WalkDir::new(dir)
      .sort_by_file_name()
      .into_iter()
      .filter_map(Result::ok)
      .filter(|entry| entry.file_type().is_file() && is_header(entry.path()))
      .map(|entry| entry.into_path())
      .collect();
    self
      .headers
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(dir.to_path_buf(), found.clone());
    found
  }
}

fn is_header(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .is_some_and(|ext| HEADER_EXTENSIONS.contains(&ext))
}

/// Compute a node's fingerprint.
///
/// `predecessors` are the fingerprints of the node's direct predecessors;
/// their order does not matter.
pub fn fingerprint(unit: &BuildUnit, predecessors: &[(NodeId, ContentHash)], cache: &DigestCache) -> ContentHash {
  let mut hasher = FieldHasher::new();
  hasher
    .field("id", unit.id.as_str())
    .field("kind", unit.kind.as_str())
    .field("action", &unit.action.describe());

  for input in &unit.inputs {
    hash_path(&mut hasher, "input", input, cache);
  }
  for dir in &unit.header_dirs {
    for header in cache.headers(dir) {
      hash_path(&mut hasher, "header", &header, cache);
    }
  }
  for output in &unit.outputs {
    hasher.field("output", &output.display().to_string());
  }

  let mut predecessors: Vec<&(NodeId, ContentHash)> = predecessors.iter().collect();
  predecessors.sort();
  for (id, digest) in predecessors {
    hasher.field("after", id.as_str()).field("digest", &digest.0);
  }

  hasher.finish()
}

fn hash_path(hasher: &mut FieldHasher, label: &str, path: &Path, cache: &DigestCache) {
  let digest = cache.digest(path);
  hasher
    .field(label, &path.display().to_string())
    .field("digest", digest.as_ref().map_or("missing", |d| d.0.as_str()));
}

//! Persistent fingerprint store.
//!
//! One JSON file per project root:
//!
//! ```text
//! <root>/.iceforge/fingerprints.json
//! {
//!   "version": 1,
//!   "entries": {
//!     "compile:core:a.c": { "fingerprint": "9f2c…", "outputs": ["build/debug/obj/core/a.c.o"] },
//!     "fetch:json": { "fingerprint": "41d0…", "outputs": ["build/deps/json"], "revision": "8c1e…" }
//!   }
//! }
//! ```
//!
//! Unknown keys are ignored on load. Writes go to a temp file that is renamed
//! over the store, so an interrupted flush leaves the previous store intact.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::consts::{FINGERPRINT_FILENAME, STATE_DIR};
use crate::graph::NodeId;
use crate::util::hash::ContentHash;

/// Current store format version.
pub const STORE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("failed to read {}: {source}", .path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write {}: {source}", .path.display())]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to serialize fingerprints: {0}")]
  Serialize(#[from] serde_json::Error),
}

/// What was recorded for a node after it last completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintRecord {
  pub fingerprint: ContentHash,
  pub outputs: Vec<PathBuf>,
  /// Commit a fetch node last checked out.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub revision: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
  version: u32,
  #[serde(default)]
  entries: BTreeMap<NodeId, FingerprintRecord>,
}

#[derive(Debug, Default)]
struct State {
  entries: BTreeMap<NodeId, FingerprintRecord>,
  dirty: bool,
}

/// Fingerprints keyed by node id, shared by every scheduler worker.
///
/// All access goes through one lock; workers record a node only after it
/// reaches a terminal state.
#[derive(Debug)]
pub struct FingerprintStore {
  path: PathBuf,
  state: Mutex<State>,
}

impl FingerprintStore {
  /// Load the store under `root`, or start empty if there is none.
  ///
  /// A file that cannot be parsed, or that has an unsupported version, is
  /// discarded with a warning: the next build is simply a full rebuild.
  ///
  /// # Errors
  ///
  /// Returns [`StoreError::Read`] if the file exists but cannot be read.
  pub fn open(root: &Path) -> Result<Self, StoreError> {
    Self::load(root.join(STATE_DIR).join(FINGERPRINT_FILENAME))
  }

  /// Load the store from an explicit file path.
  pub fn load(path: PathBuf) -> Result<Self, StoreError> {
    let content = match fs::read_to_string(&path) {
      Ok(content) => Some(content),
      Err(e) if e.kind() == io::ErrorKind::NotFound => None,
      Err(source) => return Err(StoreError::Read { path, source }),
    };

    let entries = match content.map(|c| serde_json::from_str::<StoreFile>(&c)) {
      None => BTreeMap::new(),
      Some(Ok(file)) if file.version == STORE_VERSION => file.entries,
      Some(Ok(file)) => {
        warn!(path = %path.display(), version = file.version, "unsupported fingerprint store version, starting fresh");
        BTreeMap::new()
      }
      Some(Err(e)) => {
        warn!(path = %path.display(), error = %e, "corrupt fingerprint store, starting fresh");
        BTreeMap::new()
      }
    };

    debug!(path = %path.display(), entries = entries.len(), "fingerprint store loaded");
    Ok(Self {
      path,
      state: Mutex::new(State { entries, dirty: false }),
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn get(&self, id: &NodeId) -> Option<FingerprintRecord> {
    self.lock().entries.get(id).cloned()
  }

  pub fn record(&self, id: NodeId, record: FingerprintRecord) {
    let mut state = self.lock();
    if state.entries.get(&id) != Some(&record) {
      state.entries.insert(id, record);
      state.dirty = true;
    }
  }

  /// Drop a node's record so it is stale on the next build.
  pub fn forget(&self, id: &NodeId) {
    let mut state = self.lock();
    if state.entries.remove(id).is_some() {
      state.dirty = true;
    }
  }

  pub fn len(&self) -> usize {
    self.lock().entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().entries.is_empty()
  }

  /// Write the store to disk if anything changed since it was loaded.
  ///
  /// # Errors
  ///
  /// [`StoreError::Write`] if the state directory, temp file or rename fails.
  pub fn flush(&self) -> Result<(), StoreError> {
    let mut state = self.lock();
    if !state.dirty {
      return Ok(());
    }

    let file = StoreFile {
      version: STORE_VERSION,
      entries: state.entries.clone(),
    };
    let content = serde_json::to_string_pretty(&file)?;

    let write_err = |source: io::Error| StoreError::Write {
      path: self.path.clone(),
      source,
    };
    if let Some(parent) = self.path.parent() {
      fs::create_dir_all(parent).map_err(write_err)?;
    }
    let temp_path = self.path.with_extension("json.tmp");
    fs::write(&temp_path, content).map_err(write_err)?;
    fs::rename(&temp_path, &self.path).map_err(write_err)?;

    state.dirty = false;
    debug!(path = %self.path.display(), entries = state.entries.len(), "fingerprint store flushed");
    Ok(())
  }

  fn lock(&self) -> MutexGuard<'_, State> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

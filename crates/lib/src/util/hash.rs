//! SHA-256 helpers for content digests and fingerprints.

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A full 64-character lowercase hex SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Hash a file's contents, streaming it in 8 KiB chunks.
pub fn hash_file(path: &Path) -> io::Result<ContentHash> {
  let mut file = fs::File::open(path)?;
  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];

  loop {
    let bytes_read = file.read(&mut buffer)?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(ContentHash(hex::encode(hasher.finalize())))
}

pub fn hash_bytes(data: &[u8]) -> ContentHash {
  ContentHash(hex::encode(Sha256::digest(data)))
}

/// Incremental digest over a sequence of labelled fields.
///
/// Every field is length-prefixed, so `("ab", "c")` and `("a", "bc")` never
/// produce the same digest.
#[derive(Default)]
pub struct FieldHasher {
  inner: Sha256,
}

impl FieldHasher {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn field(&mut self, label: &str, value: &str) -> &mut Self {
    for part in [label, value] {
      self.inner.update((part.len() as u64).to_le_bytes());
      self.inner.update(part.as_bytes());
    }
    self
  }

  pub fn finish(self) -> ContentHash {
    ContentHash(hex::encode(self.inner.finalize()))
  }
}

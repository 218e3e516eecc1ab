//! Remote dependency checkouts.
//!
//! Checkouts live at `<build_dir>/deps/<name>/` with their `.git` directory
//! intact. A checkout already at the requested revision is left alone; a
//! checkout at any other revision is replaced by a fresh clone of that ref.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use super::FetchStep;

/// Errors from the VCS fetcher and the package query.
#[derive(Debug, Error)]
pub enum FetchError {
  #[error("failed to prepare checkout directory '{}': {source}", .path.display())]
  CheckoutDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to clone repository '{url}': {source}")]
  Clone {
    url: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("failed to open repository at '{}': {source}", .path.display())]
  Open {
    path: PathBuf,
    #[source]
    source: Box<gix::open::Error>,
  },

  #[error("failed to check out '{rev}': {source}")]
  Checkout {
    rev: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("package query `{query}` failed: {message}")]
  PackageNotFound { query: String, message: String },

  #[error("failed to run {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },
}

/// Ensures a local checkout of a remote dependency exists at a given version.
pub trait VcsFetcher: Send + Sync {
  /// Make `step.checkout` hold `step.source` at `step.version`, returning
  /// the id of the commit now checked out.
  ///
  /// Idempotent. With `refresh` set, cached state is discarded and the
  /// source is fetched again even if the checkout looks current.
  fn ensure_checkout(&self, step: &FetchStep, refresh: bool) -> Result<String, FetchError>;
}

/// [`VcsFetcher`] backed by gix.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitFetcher;

impl VcsFetcher for GitFetcher {
  fn ensure_checkout(&self, step: &FetchStep, refresh: bool) -> Result<String, FetchError> {
    let dest = &step.checkout;
    let version = step.version.as_deref();

    if dest.join(".git").exists() {
      debug!(path = %dest.display(), "opening existing checkout");
      let repo = gix::open(dest).map_err(|e| FetchError::Open {
        path: dest.clone(),
        source: Box::new(e),
      })?;

      if !refresh && is_at_version(&repo, version) {
        debug!(url = %step.source, version = ?version, "checkout already at requested version");
        return head_revision(&repo, version);
      }

      info!(url = %step.source, version = ?version, "replacing checkout");
      fs::remove_dir_all(dest).map_err(|e| FetchError::CheckoutDir {
        path: dest.clone(),
        source: e,
      })?;
    } else if dest.exists() {
      fs::remove_dir_all(dest).map_err(|e| FetchError::CheckoutDir {
        path: dest.clone(),
        source: e,
      })?;
    }

    if let Some(parent) = dest.parent() {
      fs::create_dir_all(parent).map_err(|e| FetchError::CheckoutDir {
        path: parent.to_path_buf(),
        source: e,
      })?;
    }

    info!(url = %step.source, version = ?version, path = %dest.display(), "cloning repository");
    let repo = clone_repo(&step.source, version, dest)?;
    let revision = head_revision(&repo, version)?;
    debug!(url = %step.source, revision = %revision, "checked out");
    Ok(revision)
  }
}

/// Hex id of the commit HEAD points at.
fn head_revision(repo: &gix::Repository, rev: Option<&str>) -> Result<String, FetchError> {
  let commit = repo.head_commit().map_err(|e| FetchError::Checkout {
    rev: rev.unwrap_or("HEAD").to_string(),
    source: Box::new(e),
  })?;
  Ok(commit.id.to_string())
}

/// Clone `url` into `dest`, checking out `rev` (a branch or tag) or the remote HEAD.
fn clone_repo(url: &str, rev: Option<&str>, dest: &Path) -> Result<gix::Repository, FetchError> {
  let clone_err = |e: Box<dyn std::error::Error + Send + Sync>| FetchError::Clone {
    url: url.to_string(),
    source: e,
  };

  let mut prepared = gix::prepare_clone(url, dest).map_err(|e| clone_err(Box::new(e)))?;
  if let Some(rev) = rev {
    prepared = prepared.with_ref_name(Some(rev)).map_err(|e| clone_err(Box::new(e)))?;
  }

  let (mut checkout, _outcome) = prepared
    .fetch_then_checkout(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
    .map_err(|e| clone_err(Box::new(e)))?;

  let (repo, _outcome) = checkout
    .main_worktree(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
    .map_err(|e| FetchError::Checkout {
      rev: rev.unwrap_or("HEAD").to_string(),
      source: Box::new(e),
    })?;

  Ok(repo)
}

/// Whether HEAD already points at the commit `rev` resolves to.
///
/// Without a requested revision any existing checkout is accepted.
fn is_at_version(repo: &gix::Repository, rev: Option<&str>) -> bool {
  let Some(rev) = rev else {
    return true;
  };

  let wanted = repo
    .rev_parse_single(rev)
    .ok()
    .and_then(|id| id.object().ok())
    .and_then(|object| object.peel_to_commit().ok())
    .map(|commit| commit.id);
  let head = repo.head_commit().ok().map(|commit| commit.id);

  matches!((wanted, head), (Some(wanted), Some(head)) if wanted == head)
}

//! Manifest loading: read `iceforge.toml`, parse it into the raw manifest
//! types and resolve it against the directory it lives in.

use std::fs;
use std::io;
use std::num::ParseIntError;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use iceforge_lib::consts::JOBS_ENV;
use iceforge_lib::error::ConfigError;
use iceforge_lib::manifest::RawManifest;
use iceforge_lib::project::{Project, resolve};

#[derive(Debug, Error)]
pub enum LoadError {
  #[error("failed to read manifest {}: {source}", .path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse manifest {}: {source}", .path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error(transparent)]
  Invalid(#[from] ConfigError),

  #[error("{env} must be a number, got `{value}`", env = JOBS_ENV)]
  Jobs {
    value: String,
    #[source]
    source: ParseIntError,
  },
}

/// Load and resolve the manifest at `path`. The project root is the
/// manifest's directory.
pub fn load_project(path: &Path) -> Result<Project, LoadError> {
  let path = std::path::absolute(path).map_err(|source| LoadError::Read {
    path: path.to_path_buf(),
    source,
  })?;
  let text = fs::read_to_string(&path).map_err(|source| LoadError::Read {
    path: path.clone(),
    source,
  })?;
  let raw: RawManifest = toml::from_str(&text).map_err(|source| LoadError::Parse {
    path: path.clone(),
    source,
  })?;

  let root = path.parent().unwrap_or(Path::new("/"));
  let project = resolve(&raw, root)?;
  debug!(
    manifest = %path.display(),
    subprojects = project.subprojects.len(),
    dependencies = project.dependencies.len(),
    rules = project.rules.len(),
    "manifest loaded"
  );
  Ok(project)
}

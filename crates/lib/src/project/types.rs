//! The validated, fully linked project model.
//!
//! Cross-entity references are arena indices assigned by the resolver, so code
//! downstream of [`super::resolve`] never looks names up again.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::consts::{DEPS_DIR, STATE_DIR};
use crate::template::Template;

pub use crate::manifest::{BuildMethod, RebuildRule, SubprojectKind};

/// Index of a subproject in [`Project::subprojects`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubprojectId(pub(crate) usize);

/// Index of a dependency in [`Project::dependencies`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DependencyId(pub(crate) usize);

/// Index of a rule in [`Project::rules`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub(crate) usize);

impl SubprojectId {
  pub fn index(self) -> usize {
    self.0
  }
}

impl DependencyId {
  pub fn index(self) -> usize {
    self.0
  }
}

impl RuleId {
  pub fn index(self) -> usize {
    self.0
  }
}

/// A subproject's resolved dependency entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
  Subproject(SubprojectId),
  Dependency(DependencyId),
  /// A dotted `dependency.component` name. The manifest format has no way to
  /// declare components, so these fail during dependency orchestration.
  Component { name: String },
}

/// Debug or release flag set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
  #[default]
  Debug,
  Release,
}

impl Profile {
  pub fn as_str(self) -> &'static str {
    match self {
      Profile::Debug => "debug",
      Profile::Release => "release",
    }
  }
}

impl fmt::Display for Profile {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Resolved `[build]` settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSettings {
  pub version: String,
  pub compiler: String,
  pub c_standard: String,
  pub global_cflags: Vec<String>,
  pub debug_flags: Vec<String>,
  pub release_flags: Vec<String>,
  pub parallel_jobs: Option<usize>,
  pub archiver: String,
  /// Absolute build output directory.
  pub build_dir: PathBuf,
}

impl BuildSettings {
  pub fn profile_flags(&self, profile: Profile) -> &[String] {
    match profile {
      Profile::Debug => &self.debug_flags,
      Profile::Release => &self.release_flags,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySpec {
  pub id: DependencyId,
  pub name: String,
  pub kind: DependencyKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyKind {
  Remote(RemoteDependency),
  PkgConfig { query: String },
  Manual { cflags: Vec<String>, ldflags: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDependency {
  pub source: String,
  pub version: Option<String>,
  pub include_name: Option<String>,
  /// Relative to the checkout.
  pub include_dirs: Vec<String>,
  pub build_method: BuildMethod,
  pub build_command: Option<String>,
  /// Relative to the checkout unless absolute.
  pub build_output: Option<String>,
  pub imports: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subproject {
  pub id: SubprojectId,
  pub name: String,
  pub kind: SubprojectKind,
  /// Absolute. `None` only for header-only subprojects.
  pub src_dir: Option<PathBuf>,
  /// Absolute.
  pub include_dirs: Vec<PathBuf>,
  pub references: Vec<Reference>,
  pub output_name: String,
  pub compiler: String,
  pub c_standard: String,
  /// Override cflags, appended after global and profile flags.
  pub extra_cflags: Vec<String>,
  pub extra_debug_flags: Vec<String>,
  pub extra_release_flags: Vec<String>,
  /// Override job cap for this subproject's nodes.
  pub job_cap: Option<usize>,
}

impl Subproject {
  pub fn extra_profile_flags(&self, profile: Profile) -> &[String] {
    match profile {
      Profile::Debug => &self.extra_debug_flags,
      Profile::Release => &self.extra_release_flags,
    }
  }

  /// Directories whose headers are visible to this subproject's dependents.
  pub fn exported_dirs(&self) -> impl Iterator<Item = &Path> {
    self.include_dirs.iter().map(PathBuf::as_path).chain(self.src_dir.as_deref())
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomBuildRule {
  pub id: RuleId,
  pub name: String,
  pub description: Option<String>,
  /// Absolute.
  pub src_dir: PathBuf,
  /// Absolute.
  pub output_dir: PathBuf,
  /// Lowercase, without the leading dot.
  pub trigger_extensions: BTreeSet<String>,
  pub output_extension: String,
  pub command: Template,
  pub rebuild_rule: RebuildRule,
}

impl CustomBuildRule {
  pub fn matches(&self, path: &Path) -> bool {
    path
      .extension()
      .and_then(|ext| ext.to_str())
      .is_some_and(|ext| self.trigger_extensions.contains(&ext.to_ascii_lowercase()))
  }
}

/// The root aggregate. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
  pub root: PathBuf,
  pub settings: BuildSettings,
  pub dependencies: Vec<DependencySpec>,
  pub subprojects: Vec<Subproject>,
  pub rules: Vec<CustomBuildRule>,
}

impl Project {
  pub fn subproject(&self, id: SubprojectId) -> &Subproject {
    &self.subprojects[id.0]
  }

  pub fn dependency(&self, id: DependencyId) -> &DependencySpec {
    &self.dependencies[id.0]
  }

  pub fn rule(&self, id: RuleId) -> &CustomBuildRule {
    &self.rules[id.0]
  }

  pub fn find_subproject(&self, name: &str) -> Option<&Subproject> {
    self.subprojects.iter().find(|s| s.name == name)
  }

  /// `<build_dir>/<profile>`
  pub fn profile_dir(&self, profile: Profile) -> PathBuf {
    self.settings.build_dir.join(profile.as_str())
  }

  /// Object file for a source path relative to the subproject's `src_dir`.
  pub fn object_path(&self, subproject: &Subproject, profile: Profile, relative_source: &Path) -> PathBuf {
    let mut file = relative_source.as_os_str().to_os_string();
    file.push(".o");
    self
      .profile_dir(profile)
      .join("obj")
      .join(&subproject.name)
      .join(file)
  }

  /// Archive or executable produced by a subproject. Header-only subprojects have none.
  pub fn artifact_path(&self, subproject: &Subproject, profile: Profile) -> Option<PathBuf> {
    let dir = self.profile_dir(profile);
    match subproject.kind {
      SubprojectKind::Library => Some(dir.join("lib").join(format!("lib{}.a", subproject.output_name))),
      SubprojectKind::Binary => Some(dir.join("bin").join(&subproject.output_name)),
      SubprojectKind::HeaderOnly => None,
    }
  }

  /// Local checkout location of a remote dependency.
  pub fn checkout_dir(&self, dependency: &str) -> PathBuf {
    self.settings.build_dir.join(DEPS_DIR).join(dependency)
  }

  /// `<root>/.iceforge`
  pub fn state_dir(&self) -> PathBuf {
    self.root.join(STATE_DIR)
  }
}

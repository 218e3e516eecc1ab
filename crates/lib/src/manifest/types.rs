//! Raw manifest types, as produced by a deserializer.
//!
//! Every field the resolver has to check for presence is optional here so that
//! all missing fields can be reported in a single pass.

use serde::{Deserialize, Serialize};

/// The parsed, unvalidated manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawManifest {
  pub build: Option<RawBuildSettings>,
  pub dependencies: RawDependencies,
  pub subprojects: Vec<RawSubproject>,
  pub custom_build_rules: Vec<RawCustomBuildRule>,
  pub overrides: Vec<RawOverride>,
}

/// The `[build]` section.
///
/// Flag fields are whitespace-separated strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawBuildSettings {
  pub version: Option<String>,
  pub c_standard: Option<String>,
  pub compiler: Option<String>,
  pub global_cflags: Option<String>,
  pub debug_flags: Option<String>,
  pub release_flags: Option<String>,
  pub parallel_jobs: Option<usize>,
  pub archiver: Option<String>,
  pub build_dir: Option<String>,
}

/// The `[dependencies]` table with its three repeatable kinds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawDependencies {
  pub remote: Vec<RawRemoteDependency>,
  pub pkg_config: Vec<RawPkgConfigDependency>,
  pub manual: Vec<RawManualDependency>,
}

/// How a remote dependency is turned into something linkable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildMethod {
  HeaderOnly,
  Cmake,
  Custom,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRemoteDependency {
  pub name: Option<String>,
  pub version: Option<String>,
  pub source: Option<String>,
  pub include_name: Option<String>,
  pub include_dirs: Vec<String>,
  pub build_method: Option<BuildMethod>,
  pub build_command: Option<String>,
  pub build_output: Option<String>,
  pub imports: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawPkgConfigDependency {
  pub name: Option<String>,
  pub pkg_config_query: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawManualDependency {
  pub name: Option<String>,
  pub cflags: Option<String>,
  pub ldflags: Option<String>,
}

/// Subproject kind, spelled `binary`, `library` or `header-only`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubprojectKind {
  Binary,
  Library,
  HeaderOnly,
}

/// A subproject's dependency entry: either a bare name or a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawReference {
  Named(String),
  Detailed {
    name: String,
    #[serde(default)]
    imports: Vec<String>,
  },
}

impl RawReference {
  pub fn name(&self) -> &str {
    match self {
      RawReference::Named(name) => name,
      RawReference::Detailed { name, .. } => name,
    }
  }

  pub fn imports(&self) -> &[String] {
    match self {
      RawReference::Named(_) => &[],
      RawReference::Detailed { imports, .. } => imports,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSubproject {
  pub name: Option<String>,
  #[serde(rename = "type")]
  pub kind: Option<SubprojectKind>,
  pub src_dir: Option<String>,
  pub include_dirs: Vec<String>,
  pub dependencies: Vec<RawReference>,
  pub output_name: Option<String>,
}

/// When a custom build rule re-runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RebuildRule {
  IfChanged,
  Always,
  OnTrigger,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawCustomBuildRule {
  pub name: Option<String>,
  pub description: Option<String>,
  pub src_dir: Option<String>,
  pub output_dir: Option<String>,
  pub trigger_extensions: Vec<String>,
  pub output_extension: Option<String>,
  pub command: Option<String>,
  pub rebuild_rule: Option<RebuildRule>,
}

/// Per-subproject adjustments. `name` is the target subproject.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawOverride {
  pub name: Option<String>,
  pub compiler: Option<String>,
  pub c_standard: Option<String>,
  pub cflags: Option<String>,
  pub debug_flags: Option<String>,
  pub release_flags: Option<String>,
  pub parallel_jobs: Option<usize>,
}

//! Dependency Orchestrator.
//!
//! Decides, per declared dependency, whether it only contributes flags or
//! whether it needs a fetch and a build before anything can link against it:
//!
//! | Declaration | Plan |
//! |---|---|
//! | manual | flag-only, literal cflags/ldflags |
//! | pkg_config | flag-only, flags from [`PackageQuery`] |
//! | remote, header-only | fetch, then flag-only include dirs |
//! | remote, cmake/custom | fetch, then dependency build |
//!
//! A failed package query does not abort orchestration: the dependency is
//! planned as a flag-only node that is already failed, so only the
//! subprojects that use it are affected.

pub mod fetch;
pub mod pkg_config;

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::ResolutionError;
use crate::project::{BuildMethod, DependencyId, DependencyKind, Profile, Project, Reference, RemoteDependency};

pub use fetch::{FetchError, GitFetcher, VcsFetcher};
pub use pkg_config::{PackageFlags, PackageQuery, PkgConfig};

/// A remote checkout the fetcher must provide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchStep {
  pub source: String,
  pub version: Option<String>,
  pub checkout: PathBuf,
}

/// How a cmake/custom dependency is built inside its checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyBuild {
  /// Shell command, run from the checkout.
  pub command: String,
  pub output: PathBuf,
}

/// What a dependency hands to the subprojects that use it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contribution {
  pub include_dirs: Vec<PathBuf>,
  pub cflags: Vec<String>,
  pub ldflags: Vec<String>,
  /// Libraries to put on the link line.
  pub artifacts: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyPlan {
  /// Never executed. Header-only remotes still need their checkout.
  FlagOnly {
    fetch: Option<FetchStep>,
    /// Set when the flags could not be obtained.
    failure: Option<String>,
  },
  Build { fetch: FetchStep, build: DependencyBuild },
}

impl DependencyPlan {
  pub fn fetch(&self) -> Option<&FetchStep> {
    match self {
      DependencyPlan::FlagOnly { fetch, .. } => fetch.as_ref(),
      DependencyPlan::Build { fetch, .. } => Some(fetch),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDependency {
  pub id: DependencyId,
  pub name: String,
  pub plan: DependencyPlan,
  pub contribution: Contribution,
}

/// Orchestration output, indexed like [`Project::dependencies`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyPlans {
  resolved: Vec<ResolvedDependency>,
}

impl DependencyPlans {
  pub fn get(&self, id: DependencyId) -> &ResolvedDependency {
    &self.resolved[id.index()]
  }

  pub fn iter(&self) -> impl Iterator<Item = &ResolvedDependency> {
    self.resolved.iter()
  }

  pub fn len(&self) -> usize {
    self.resolved.len()
  }

  pub fn is_empty(&self) -> bool {
    self.resolved.is_empty()
  }
}

/// Plan every declared dependency.
///
/// # Arguments
///
/// * `project` - The resolved project
/// * `profile` - Selects the cmake build type
/// * `packages` - Answers pkg-config queries
///
/// # Errors
///
/// [`ResolutionError::MissingBuildCommand`] for a custom remote without a
/// `build_command`, and [`ResolutionError::UnresolvedComponent`] for any
/// dotted `dependency.component` reference.
pub fn orchestrate(
  project: &Project,
  profile: Profile,
  packages: &dyn PackageQuery,
) -> Result<DependencyPlans, ResolutionError> {
  check_component_references(project)?;

  let mut resolved = Vec::with_capacity(project.dependencies.len());
  for dep in &project.dependencies {
    let (plan, contribution) = match &dep.kind {
      DependencyKind::Manual { cflags, ldflags } => (
        DependencyPlan::FlagOnly {
          fetch: None,
          failure: None,
        },
        Contribution {
          cflags: cflags.clone(),
          ldflags: ldflags.clone(),
          ..Default::default()
        },
      ),
      DependencyKind::PkgConfig { query } => match packages.query(query) {
        Ok(flags) => (
          DependencyPlan::FlagOnly {
            fetch: None,
            failure: None,
          },
          Contribution {
            cflags: flags.cflags,
            ldflags: flags.ldflags,
            ..Default::default()
          },
        ),
        Err(e) => {
          warn!(dependency = %dep.name, error = %e, "package query failed");
          (
            DependencyPlan::FlagOnly {
              fetch: None,
              failure: Some(e.to_string()),
            },
            Contribution::default(),
          )
        }
      },
      DependencyKind::Remote(remote) => plan_remote(project, &dep.name, remote, profile)?,
    };

    debug!(dependency = %dep.name, plan = ?plan, "dependency planned");
    resolved.push(ResolvedDependency {
      id: dep.id,
      name: dep.name.clone(),
      plan,
      contribution,
    });
  }

  Ok(DependencyPlans { resolved })
}

fn plan_remote(
  project: &Project,
  name: &str,
  remote: &RemoteDependency,
  profile: Profile,
) -> Result<(DependencyPlan, Contribution), ResolutionError> {
  let checkout = project.checkout_dir(name);
  let fetch = FetchStep {
    source: remote.source.clone(),
    version: remote.version.clone(),
    checkout: checkout.clone(),
  };

  let include_dirs = if remote.include_dirs.is_empty() {
    vec![checkout.join("include")]
  } else {
    remote.include_dirs.iter().map(|dir| checkout.join(dir)).collect()
  };

  let build = match remote.build_method {
    BuildMethod::HeaderOnly => {
      let plan = DependencyPlan::FlagOnly {
        fetch: Some(fetch),
        failure: None,
      };
      return Ok((
        plan,
        Contribution {
          include_dirs,
          ..Default::default()
        },
      ));
    }
    BuildMethod::Cmake => DependencyBuild {
      command: remote.build_command.clone().unwrap_or_else(|| cmake_command(profile)),
      output: output_path(&checkout, remote.build_output.as_deref(), &format!("build/lib{name}.a")),
    },
    BuildMethod::Custom => {
      let command = remote
        .build_command
        .clone()
        .ok_or_else(|| ResolutionError::MissingBuildCommand {
          dependency: name.to_string(),
        })?;
      DependencyBuild {
        command,
        output: output_path(&checkout, remote.build_output.as_deref(), &format!("lib{name}.a")),
      }
    }
  };

  let contribution = Contribution {
    include_dirs,
    artifacts: vec![build.output.clone()],
    ..Default::default()
  };
  Ok((DependencyPlan::Build { fetch, build }, contribution))
}

fn cmake_command(profile: Profile) -> String {
  let build_type = match profile {
    Profile::Debug => "Debug",
    Profile::Release => "Release",
  };
  format!("cmake -S . -B build -DCMAKE_BUILD_TYPE={build_type} && cmake --build build")
}

fn output_path(checkout: &Path, declared: Option<&str>, inferred: &str) -> PathBuf {
  checkout.join(declared.unwrap_or(inferred))
}

fn check_component_references(project: &Project) -> Result<(), ResolutionError> {
  for sub in &project.subprojects {
    for reference in &sub.references {
      if let Reference::Component { name } = reference {
        let dependency = name.split('.').next().unwrap_or(name).to_string();
        return Err(ResolutionError::UnresolvedComponent {
          subproject: sub.name.clone(),
          reference: name.clone(),
          dependency,
        });
      }
    }
  }
  Ok(())
}

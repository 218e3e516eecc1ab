//! Engine entry points: `build`, `refresh` and `clean`.
//!
//! An [`Engine`] bundles the three external collaborators. The defaults
//! spawn real processes, clone with git and ask `pkg-config`; tests swap in
//! recording doubles.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::consts::DEPS_DIR;
use crate::deps::{GitFetcher, PackageQuery, PkgConfig, VcsFetcher, orchestrate};
use crate::error::{EngineError, ResolutionError};
use crate::execute::{BuildReport, CancelFlag, ExecuteConfig, ProcessExecutor, Scheduler, ShellExecutor, default_jobs};
use crate::graph::{BuildGraph, GraphBuilder, UnitKind};
use crate::project::{Profile, Project};
use crate::stale::FingerprintStore;

/// Per-invocation build options.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
  pub profile: Profile,
  /// Global job cap. Falls back to `[build].parallel_jobs`, then the
  /// available parallelism.
  pub jobs: Option<usize>,
  /// Build only this subproject and what it depends on.
  pub subproject: Option<String>,
  /// `on-trigger` rules to run.
  pub triggers: BTreeSet<String>,
  pub cancel: CancelFlag,
}

pub struct Engine {
  executor: Arc<dyn ProcessExecutor>,
  fetcher: Arc<dyn VcsFetcher>,
  packages: Arc<dyn PackageQuery>,
}

impl Default for Engine {
  fn default() -> Self {
    Self::new(Arc::new(ShellExecutor), Arc::new(GitFetcher), Arc::new(PkgConfig::default()))
  }
}

impl Engine {
  pub fn new(
    executor: Arc<dyn ProcessExecutor>,
    fetcher: Arc<dyn VcsFetcher>,
    packages: Arc<dyn PackageQuery>,
  ) -> Self {
    Self {
      executor,
      fetcher,
      packages,
    }
  }

  /// Orchestrate dependencies and expand the build graph without running it.
  ///
  /// # Errors
  ///
  /// Any [`ResolutionError`]: cycles, unresolved components, an unknown
  /// subproject filter, or an unreadable source directory.
  pub fn plan(&self, project: &Project, options: &BuildOptions) -> Result<BuildGraph, EngineError> {
    let plans = orchestrate(project, options.profile, self.packages.as_ref())?;
    let graph = GraphBuilder::new(project, &plans, options.profile).build()?;

    let Some(name) = options.subproject.as_deref() else {
      return Ok(graph);
    };
    if project.find_subproject(name).is_none() {
      return Err(ResolutionError::UnknownSubproject { name: name.to_string() }.into());
    }

    let filtered = graph.restrict(|unit| {
      unit.owner == name && matches!(unit.kind, UnitKind::Compile | UnitKind::Archive | UnitKind::Link)
    });
    debug!(subproject = name, nodes = filtered.len(), "graph filtered");
    Ok(filtered)
  }

  /// Build the project, or one subproject of it.
  ///
  /// # Arguments
  ///
  /// * `project` - The resolved project
  /// * `options` - Profile, job cap, filter, triggers and cancellation
  ///
  /// # Errors
  ///
  /// Pre-execution problems only. Node failures are reported in the
  /// returned [`BuildReport`].
  pub async fn build(&self, project: &Project, options: &BuildOptions) -> Result<BuildReport, EngineError> {
    let graph = self.plan(project, options)?;
    let config = ExecuteConfig {
      jobs: job_cap(project, options.jobs),
      triggers: options.triggers.clone(),
      force_fetch: false,
      cancel: options.cancel.clone(),
    };

    info!(profile = %options.profile, nodes = graph.len(), jobs = config.jobs, "build planned");
    self.schedule(project, &graph, &config).await
  }

  /// Re-fetch every remote dependency, ignoring checkouts already present.
  ///
  /// # Errors
  ///
  /// Same as [`Engine::build`].
  pub async fn refresh(&self, project: &Project, cancel: CancelFlag) -> Result<BuildReport, EngineError> {
    let plans = orchestrate(project, Profile::default(), self.packages.as_ref())?;
    let graph = GraphBuilder::new(project, &plans, Profile::default()).fetch_only()?;
    let config = ExecuteConfig {
      jobs: job_cap(project, None),
      triggers: BTreeSet::new(),
      force_fetch: true,
      cancel,
    };

    info!(dependencies = graph.len(), "refreshing remote dependencies");
    self.schedule(project, &graph, &config).await
  }

  async fn schedule(
    &self,
    project: &Project,
    graph: &BuildGraph,
    config: &ExecuteConfig,
  ) -> Result<BuildReport, EngineError> {
    let store = Arc::new(FingerprintStore::open(&project.root)?);
    let scheduler = Scheduler::new(self.executor.clone(), self.fetcher.clone(), store);
    Ok(scheduler.run(graph, config).await?)
  }
}

/// Effective global job cap: explicit, then `[build].parallel_jobs`, then
/// the available parallelism.
pub fn job_cap(project: &Project, explicit: Option<usize>) -> usize {
  explicit
    .or(project.settings.parallel_jobs)
    .unwrap_or_else(default_jobs)
    .max(1)
}

/// Remove build outputs and the fingerprint store.
///
/// Profile directories under the build dir go, along with `.iceforge/`.
/// Dependency checkouts survive unless `all` is set.
///
/// # Errors
///
/// The first I/O error hit while removing a directory.
pub fn clean(project: &Project, all: bool) -> io::Result<Vec<PathBuf>> {
  let mut targets: Vec<PathBuf> = [Profile::Debug, Profile::Release]
    .into_iter()
    .map(|profile| project.profile_dir(profile))
    .collect();
  targets.push(project.state_dir());
  if all {
    targets.push(project.settings.build_dir.join(DEPS_DIR));
  }

  let mut removed = Vec::new();
  for target in targets {
    match fs::remove_dir_all(&target) {
      Ok(()) => {
        debug!(path = %target.display(), "removed");
        removed.push(target);
      }
      Err(e) if e.kind() == io::ErrorKind::NotFound => {}
      Err(e) => return Err(e),
    }
  }
  Ok(removed)
}

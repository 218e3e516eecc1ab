//! Expansion of the project model into build units.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::consts::SOURCE_EXTENSIONS;
use crate::deps::{Contribution, DependencyPlan, DependencyPlans, ResolvedDependency};
use crate::error::ResolutionError;
use crate::project::{
  CustomBuildRule, DependencyId, Profile, Project, RebuildRule, Reference, Subproject, SubprojectId, SubprojectKind,
};

use super::BuildGraph;
use super::types::{Action, BuildUnit, Invocation, NodeId, RebuildPolicy, Scope, UnitKind};

/// Everything a subproject links against, directly or through other subprojects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkClosure {
  /// Reachable subprojects, each listed before the subprojects it depends on.
  pub subprojects: Vec<SubprojectId>,
  /// Reachable dependencies, in the same order.
  pub dependencies: Vec<DependencyId>,
}

/// Compute the transitive link closure of every subproject.
///
/// One memoized DFS over the subproject reference graph. The result is
/// indexed like [`Project::subprojects`].
///
/// # Errors
///
/// [`ResolutionError::Cycle`] naming the subprojects on the cycle, e.g.
/// `a -> b -> a`.
pub fn link_closure(project: &Project) -> Result<Vec<LinkClosure>, ResolutionError> {
  let mut memo: Vec<Option<LinkClosure>> = vec![None; project.subprojects.len()];
  let mut stack = Vec::new();
  for sub in &project.subprojects {
    closure_of(project, sub.id, &mut memo, &mut stack)?;
  }
  Ok(memo.into_iter().map(Option::unwrap_or_default).collect())
}

fn closure_of(
  project: &Project,
  id: SubprojectId,
  memo: &mut [Option<LinkClosure>],
  stack: &mut Vec<SubprojectId>,
) -> Result<LinkClosure, ResolutionError> {
  if let Some(done) = &memo[id.index()] {
    return Ok(done.clone());
  }
  if let Some(start) = stack.iter().position(|&s| s == id) {
    let mut cycle: Vec<String> = stack[start..]
      .iter()
      .map(|&s| project.subproject(s).name.clone())
      .collect();
    cycle.push(project.subproject(id).name.clone());
    return Err(ResolutionError::Cycle { cycle });
  }

  stack.push(id);
  let mut subprojects = Vec::new();
  let mut dependencies = Vec::new();
  for reference in &project.subproject(id).references {
    match reference {
      Reference::Subproject(target) => {
        let inner = closure_of(project, *target, memo, stack)?;
        subprojects.push(*target);
        subprojects.extend(inner.subprojects);
        dependencies.extend(inner.dependencies);
      }
      Reference::Dependency(dep) => dependencies.push(*dep),
      Reference::Component { .. } => {}
    }
  }
  stack.pop();

  let closure = LinkClosure {
    subprojects: keep_last(subprojects),
    dependencies: keep_last(dependencies),
  };
  memo[id.index()] = Some(closure.clone());
  Ok(closure)
}

/// Deduplicate, keeping each item's last position, so static libraries
/// stay after everything that needs them on the link line.
fn keep_last<T: Copy + Eq + std::hash::Hash>(items: Vec<T>) -> Vec<T> {
  let mut seen = HashSet::new();
  let mut kept: Vec<T> = items.into_iter().rev().filter(|item| seen.insert(*item)).collect();
  kept.reverse();
  kept
}

/// Builds the [`BuildGraph`] for one profile.
pub struct GraphBuilder<'a> {
  project: &'a Project,
  plans: &'a DependencyPlans,
  profile: Profile,
  units: Vec<BuildUnit>,
  edges: Vec<(NodeId, NodeId)>,
}

impl<'a> GraphBuilder<'a> {
  pub fn new(project: &'a Project, plans: &'a DependencyPlans, profile: Profile) -> Self {
    Self {
      project,
      plans,
      profile,
      units: Vec::new(),
      edges: Vec::new(),
    }
  }

  /// Expand dependencies, then subprojects, then custom build rules.
  ///
  /// # Errors
  ///
  /// [`ResolutionError::Cycle`] for circular subproject references and
  /// [`ResolutionError::Scan`] when a source directory cannot be read.
  pub fn build(mut self) -> Result<BuildGraph, ResolutionError> {
    let closures = link_closure(self.project)?;

    for dep in self.plans.iter() {
      self.add_dependency(dep);
    }
    for sub in &self.project.subprojects {
      self.add_subproject(sub, &closures[sub.id.index()])?;
    }
    for rule in &self.project.rules {
      self.add_rule(rule)?;
    }

    debug!(units = self.units.len(), edges = self.edges.len(), profile = %self.profile, "build graph expanded");
    BuildGraph::new(self.units, &self.edges)
  }

  /// A graph holding only the fetch node of every remote dependency.
  pub fn fetch_only(mut self) -> Result<BuildGraph, ResolutionError> {
    for dep in self.plans.iter() {
      if let Some(step) = dep.plan.fetch() {
        self.units.push(BuildUnit {
          id: node_id(UnitKind::Fetch, &dep.name, None),
          kind: UnitKind::Fetch,
          owner: dep.name.clone(),
          scope: Scope::Global,
          inputs: vec![],
          header_dirs: vec![],
          outputs: vec![step.checkout.clone()],
          action: Action::Fetch(step.clone()),
          rebuild: RebuildPolicy::Fingerprint,
        });
      }
    }
    BuildGraph::new(self.units, &self.edges)
  }

  fn add_dependency(&mut self, dep: &ResolvedDependency) {
    let fetch_id = dep.plan.fetch().map(|step| {
      let id = node_id(UnitKind::Fetch, &dep.name, None);
      self.units.push(BuildUnit {
        id: id.clone(),
        kind: UnitKind::Fetch,
        owner: dep.name.clone(),
        scope: Scope::Global,
        inputs: vec![],
        header_dirs: vec![],
        outputs: vec![step.checkout.clone()],
        action: Action::Fetch(step.clone()),
        rebuild: RebuildPolicy::Fingerprint,
      });
      id
    });

    let (id, unit) = match &dep.plan {
      DependencyPlan::FlagOnly { failure, .. } => {
        let id = node_id(UnitKind::FlagOnly, &dep.name, None);
        let unit = BuildUnit {
          id: id.clone(),
          kind: UnitKind::FlagOnly,
          owner: dep.name.clone(),
          scope: Scope::Global,
          inputs: vec![],
          header_dirs: vec![],
          outputs: vec![],
          action: Action::Flags {
            summary: flags_summary(&dep.name, &dep.contribution),
            failure: failure.clone(),
          },
          rebuild: RebuildPolicy::Fingerprint,
        };
        (id, unit)
      }
      DependencyPlan::Build { fetch, build } => {
        let id = node_id(UnitKind::DependencyBuild, &dep.name, None);
        let unit = BuildUnit {
          id: id.clone(),
          kind: UnitKind::DependencyBuild,
          owner: dep.name.clone(),
          scope: Scope::Global,
          inputs: vec![],
          header_dirs: vec![],
          outputs: vec![build.output.clone()],
          action: Action::dependency_build(build, fetch.checkout.clone()),
          rebuild: RebuildPolicy::Fingerprint,
        };
        (id, unit)
      }
    };

    self.units.push(unit);
    if let Some(fetch_id) = fetch_id {
      self.edges.push((fetch_id, id));
    }
  }

  fn add_subproject(&mut self, sub: &Subproject, closure: &LinkClosure) -> Result<(), ResolutionError> {
    let Some(src_dir) = sub.src_dir.as_deref() else {
      return Ok(());
    };
    if sub.kind == SubprojectKind::HeaderOnly {
      return Ok(());
    }

    let project = self.project;
    let settings = &project.settings;
    let scope = match sub.job_cap {
      Some(jobs) => Scope::Capped {
        subproject: sub.name.clone(),
        jobs,
      },
      None => Scope::Global,
    };
    let deps: Vec<&ResolvedDependency> = closure.dependencies.iter().map(|&d| self.plans.get(d)).collect();

    let mut header_dirs: Vec<PathBuf> = Vec::new();
    header_dirs.extend(sub.exported_dirs().map(Path::to_path_buf));
    for &other in &closure.subprojects {
      header_dirs.extend(project.subproject(other).exported_dirs().map(Path::to_path_buf));
    }
    let header_dirs = dedup(header_dirs);

    let mut include_dirs = header_dirs.clone();
    for dep in &deps {
      include_dirs.extend(dep.contribution.include_dirs.iter().cloned());
    }
    let include_dirs = dedup(include_dirs);

    // a refreshed checkout can change its headers without changing its version
    let mut watched_dirs = header_dirs.clone();
    for dep in deps.iter().filter(|dep| dep.plan.fetch().is_some()) {
      watched_dirs.extend(dep.contribution.include_dirs.iter().cloned());
    }
    let watched_dirs = dedup(watched_dirs);

    let mut base_args = vec![format!("-std={}", sub.c_standard)];
    base_args.extend(settings.global_cflags.iter().cloned());
    base_args.extend(settings.profile_flags(self.profile).iter().cloned());
    base_args.extend(sub.extra_profile_flags(self.profile).iter().cloned());
    base_args.extend(sub.extra_cflags.iter().cloned());
    base_args.extend(include_dirs.iter().map(|dir| format!("-I{}", dir.display())));
    for dep in &deps {
      base_args.extend(dep.contribution.cflags.iter().cloned());
    }

    let mut objects = Vec::new();
    let mut compile_ids = Vec::new();
    for relative in scan(src_dir, |path| has_extension(path, SOURCE_EXTENSIONS))? {
      let source = src_dir.join(&relative);
      let object = project.object_path(sub, self.profile, &relative);
      let id = node_id(UnitKind::Compile, &sub.name, Some(&relative));

      let mut args = base_args.clone();
      args.extend([
        "-c".to_string(),
        source.display().to_string(),
        "-o".to_string(),
        object.display().to_string(),
      ]);

      self.units.push(BuildUnit {
        id: id.clone(),
        kind: UnitKind::Compile,
        owner: sub.name.clone(),
        scope: scope.clone(),
        inputs: vec![source],
        header_dirs: watched_dirs.clone(),
        outputs: vec![object.clone()],
        action: Action::Run {
          invocation: Invocation::Exec {
            program: sub.compiler.clone(),
            args,
          },
          workdir: project.root.clone(),
        },
        rebuild: RebuildPolicy::Fingerprint,
      });
      for dep in &deps {
        self.edges.push((header_provider(dep), id.clone()));
      }
      objects.push(object);
      compile_ids.push(id);
    }

    let Some(artifact) = project.artifact_path(sub, self.profile) else {
      return Ok(());
    };

    let (kind, invocation) = if sub.kind == SubprojectKind::Library {
      let mut args = vec!["rcs".to_string(), artifact.display().to_string()];
      args.extend(objects.iter().map(|o| o.display().to_string()));
      (
        UnitKind::Archive,
        Invocation::Exec {
          program: settings.archiver.clone(),
          args,
        },
      )
    } else {
      let mut args: Vec<String> = settings.profile_flags(self.profile).to_vec();
      args.extend(sub.extra_profile_flags(self.profile).iter().cloned());
      args.extend(objects.iter().map(|o| o.display().to_string()));
      for &other in &closure.subprojects {
        let other = project.subproject(other);
        if other.kind == SubprojectKind::Library
          && let Some(lib) = project.artifact_path(other, self.profile)
        {
          args.push(lib.display().to_string());
        }
      }
      for dep in &deps {
        args.extend(dep.contribution.artifacts.iter().map(|a| a.display().to_string()));
        args.extend(dep.contribution.ldflags.iter().cloned());
      }
      args.extend(["-o".to_string(), artifact.display().to_string()]);
      (
        UnitKind::Link,
        Invocation::Exec {
          program: sub.compiler.clone(),
          args,
        },
      )
    };

    let id = node_id(kind, &sub.name, None);
    self.units.push(BuildUnit {
      id: id.clone(),
      kind,
      owner: sub.name.clone(),
      scope,
      inputs: vec![],
      header_dirs: vec![],
      outputs: vec![artifact],
      action: Action::Run {
        invocation,
        workdir: project.root.clone(),
      },
      rebuild: RebuildPolicy::Fingerprint,
    });

    for compile in compile_ids {
      self.edges.push((compile, id.clone()));
    }
    // archives and links both wait on everything link-relevant in the closure
    for &other in &closure.subprojects {
      let other = project.subproject(other);
      if other.kind == SubprojectKind::Library {
        self.edges.push((node_id(UnitKind::Archive, &other.name, None), id.clone()));
      }
    }
    for dep in &deps {
      self.edges.push((link_provider(dep), id.clone()));
    }

    Ok(())
  }

  fn add_rule(&mut self, rule: &CustomBuildRule) -> Result<(), ResolutionError> {
    let rebuild = match rule.rebuild_rule {
      RebuildRule::IfChanged => RebuildPolicy::Fingerprint,
      RebuildRule::Always => RebuildPolicy::Always,
      RebuildRule::OnTrigger => RebuildPolicy::OnTrigger(rule.name.clone()),
    };

    for relative in scan(&rule.src_dir, |path| rule.matches(path))? {
      let input = rule.src_dir.join(&relative);
      let output = rule_output(rule, &relative);
      let command = rule
        .command
        .render(&input.display().to_string(), &output.display().to_string());

      self.units.push(BuildUnit {
        id: node_id(UnitKind::CustomRule, &rule.name, Some(&relative)),
        kind: UnitKind::CustomRule,
        owner: rule.name.clone(),
        scope: Scope::Global,
        inputs: vec![input],
        header_dirs: vec![],
        outputs: vec![output],
        action: Action::Run {
          invocation: Invocation::Shell(command),
          workdir: self.project.root.clone(),
        },
        rebuild: rebuild.clone(),
      });
    }
    Ok(())
  }
}

/// `<output_dir>/<relative dir>/<file name>.<output_extension>`
fn rule_output(rule: &CustomBuildRule, relative: &Path) -> PathBuf {
  let mut file = relative.file_name().unwrap_or(relative.as_os_str()).to_os_string();
  file.push(".");
  file.push(&rule.output_extension);
  match relative.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => rule.output_dir.join(parent).join(file),
    _ => rule.output_dir.join(file),
  }
}

fn node_id(kind: UnitKind, owner: &str, relative: Option<&Path>) -> NodeId {
  match relative {
    Some(path) => NodeId(format!("{kind}:{owner}:{}", portable(path))),
    None => NodeId(format!("{kind}:{owner}")),
  }
}

/// Node a compile unit waits for before the dependency's headers exist.
fn header_provider(dep: &ResolvedDependency) -> NodeId {
  match dep.plan {
    DependencyPlan::Build { .. } => node_id(UnitKind::Fetch, &dep.name, None),
    DependencyPlan::FlagOnly { .. } => node_id(UnitKind::FlagOnly, &dep.name, None),
  }
}

/// Node a link unit waits for before the dependency's artifacts exist.
fn link_provider(dep: &ResolvedDependency) -> NodeId {
  match dep.plan {
    DependencyPlan::Build { .. } => node_id(UnitKind::DependencyBuild, &dep.name, None),
    DependencyPlan::FlagOnly { .. } => node_id(UnitKind::FlagOnly, &dep.name, None),
  }
}

fn flags_summary(name: &str, contribution: &Contribution) -> String {
  let dirs: Vec<String> = contribution.include_dirs.iter().map(|d| d.display().to_string()).collect();
  format!(
    "flags {name}: include=[{}] cflags=[{}] ldflags=[{}]",
    dirs.join(" "),
    contribution.cflags.join(" "),
    contribution.ldflags.join(" ")
  )
}

fn portable(path: &Path) -> String {
  path
    .components()
    .map(|c| c.as_os_str().to_string_lossy())
    .collect::<Vec<_>>()
    .join("/")
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .is_some_and(|ext| extensions.contains(&ext))
}

fn dedup(paths: Vec<PathBuf>) -> Vec<PathBuf> {
  let mut seen = HashSet::new();
  paths.into_iter().filter(|p| seen.insert(p.clone())).collect()
}

/// Files under `dir` accepted by `filter`, relative to `dir`, sorted.
fn scan(dir: &Path, filter: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>, ResolutionError> {
  if !dir.is_dir() {
    return Err(ResolutionError::Scan {
      path: dir.to_path_buf(),
      message: "not a directory".to_string(),
    });
  }

  let mut found = Vec::new();
  for entry in WalkDir::new(dir).sort_by_file_name() {
    let entry = entry.map_err(|e| ResolutionError::Scan {
      path: dir.to_path_buf(),
      message: e.to_string(),
    })?;
    if entry.file_type().is_file()
      && filter(entry.path())
      && let Ok(relative) = entry.path().strip_prefix(dir)
    {
      found.push(relative.to_path_buf());
    }
  }
  Ok(found)
}

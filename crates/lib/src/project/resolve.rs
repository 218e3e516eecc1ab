//! Manifest validation and normalization.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

use tracing::debug;

use crate::consts::{DEFAULT_ARCHIVER, DEFAULT_BUILD_DIR};
use crate::error::{ConfigError, Violation};
use crate::manifest::{
  RawBuildSettings, RawCustomBuildRule, RawManifest, RawOverride, RawRemoteDependency, RawSubproject, RebuildRule,
  SubprojectKind,
};
use crate::template::Template;

use super::types::{
  BuildSettings, CustomBuildRule, DependencyId, DependencyKind, DependencySpec, Project, Reference, RemoteDependency,
  RuleId, Subproject, SubprojectId,
};

/// What a name in the shared dependency/subproject namespace points at.
#[derive(Debug, Clone, Copy)]
enum NameTarget {
  Dependency(DependencyId),
  Subproject(SubprojectId),
  /// The entity was declared but rejected; references to it are not reported twice.
  Rejected,
}

struct Namespace {
  names: HashMap<String, (NameTarget, String)>,
}

impl Namespace {
  fn new() -> Self {
    Self { names: HashMap::new() }
  }

  /// Returns false if the name was already taken.
  fn declare(&mut self, name: &str, target: NameTarget, entity: String, violations: &mut Vec<Violation>) -> bool {
    if let Some((_, first)) = self.names.get(name) {
      violations.push(Violation::DuplicateName {
        name: name.to_string(),
        first: first.clone(),
        second: entity,
      });
      return false;
    }
    self.names.insert(name.to_string(), (target, entity));
    true
  }

  fn get(&self, name: &str) -> Option<NameTarget> {
    self.names.get(name).map(|(target, _)| *target)
  }
}

/// Validate a raw manifest and produce the linked project model.
///
/// Overrides are merged into their subprojects: override cflags are appended
/// after the global and profile flags, `compiler` and `c_standard` replace the
/// global values, and `parallel_jobs` becomes the subproject's own job cap.
///
/// # Arguments
///
/// * `raw` - The deserialized manifest
/// * `root` - Project root; relative paths in the manifest are resolved against it
///
/// # Errors
///
/// Returns a [`ConfigError`] listing every violation found.
pub fn resolve(raw: &RawManifest, root: &Path) -> Result<Project, ConfigError> {
  let mut violations = Vec::new();
  let mut namespace = Namespace::new();

  let settings = resolve_settings(raw.build.as_ref(), root, &mut violations);

  let mut dependencies = Vec::new();
  resolve_remotes(&raw.dependencies.remote, &mut namespace, &mut dependencies, &mut violations);

  for (index, dep) in raw.dependencies.pkg_config.iter().enumerate() {
    let entity = entity_label("pkg_config dependency", dep.name.as_deref(), index);
    let name = require_name(dep.name.as_deref(), &entity, &mut violations);
    let query = require(dep.pkg_config_query.as_deref(), &entity, "pkg_config_query", &mut violations);
    push_dependency(
      name,
      query.map(|q| DependencyKind::PkgConfig { query: q.to_string() }),
      entity,
      &mut namespace,
      &mut dependencies,
      &mut violations,
    );
  }

  for (index, dep) in raw.dependencies.manual.iter().enumerate() {
    let entity = entity_label("manual dependency", dep.name.as_deref(), index);
    let name = require_name(dep.name.as_deref(), &entity, &mut violations);
    let kind = DependencyKind::Manual {
      cflags: split_flags(dep.cflags.as_deref()),
      ldflags: split_flags(dep.ldflags.as_deref()),
    };
    push_dependency(name, Some(kind), entity, &mut namespace, &mut dependencies, &mut violations);
  }

  let mut subprojects = Vec::new();
  let mut pending_refs = Vec::new();
  for (index, raw_sub) in raw.subprojects.iter().enumerate() {
    let id = SubprojectId(subprojects.len());
    if let Some(sub) = resolve_subproject(raw_sub, index, id, root, settings.as_ref(), &mut namespace, &mut violations) {
      pending_refs.push(&raw_sub.dependencies);
      subprojects.push(sub);
    }
  }

  for (sub, raw_refs) in subprojects.iter_mut().zip(pending_refs) {
    for raw_ref in raw_refs {
      let name = raw_ref.name();
      match namespace.get(name) {
        Some(NameTarget::Subproject(id)) => sub.references.push(Reference::Subproject(id)),
        Some(NameTarget::Dependency(id)) => sub.references.push(Reference::Dependency(id)),
        Some(NameTarget::Rejected) => {}
        None if name.contains('.') => sub.references.push(Reference::Component { name: name.to_string() }),
        None => violations.push(Violation::UnknownReference {
          subproject: sub.name.clone(),
          reference: name.to_string(),
        }),
      }
    }
  }

  apply_overrides(&raw.overrides, &namespace, &mut subprojects, &mut violations);

  let rules = resolve_rules(&raw.custom_build_rules, root, &mut violations);

  match settings {
    Some(settings) if violations.is_empty() => {
      debug!(
        dependencies = dependencies.len(),
        subprojects = subprojects.len(),
        rules = rules.len(),
        "manifest resolved"
      );
      Ok(Project {
        root: root.to_path_buf(),
        settings,
        dependencies,
        subprojects,
        rules,
      })
    }
    _ => Err(ConfigError { violations }),
  }
}

fn resolve_settings(raw: Option<&RawBuildSettings>, root: &Path, violations: &mut Vec<Violation>) -> Option<BuildSettings> {
  let Some(raw) = raw else {
    violations.push(Violation::MissingBuildSection);
    return None;
  };

  let entity = "[build]".to_string();
  let version = require(raw.version.as_deref(), &entity, "version", violations);
  let compiler = require(raw.compiler.as_deref(), &entity, "compiler", violations);
  let c_standard = require(raw.c_standard.as_deref(), &entity, "c_standard", violations);
  if raw.parallel_jobs == Some(0) {
    violations.push(Violation::ZeroJobs { entity: entity.clone() });
  }

  Some(BuildSettings {
    version: version?.to_string(),
    compiler: compiler?.to_string(),
    c_standard: c_standard?.to_string(),
    global_cflags: split_flags(raw.global_cflags.as_deref()),
    debug_flags: split_flags(raw.debug_flags.as_deref()),
    release_flags: split_flags(raw.release_flags.as_deref()),
    parallel_jobs: raw.parallel_jobs.filter(|&n| n > 0),
    archiver: raw.archiver.clone().unwrap_or_else(|| DEFAULT_ARCHIVER.to_string()),
    build_dir: root.join(raw.build_dir.as_deref().unwrap_or(DEFAULT_BUILD_DIR)),
  })
}

fn resolve_remotes(
  remotes: &[RawRemoteDependency],
  namespace: &mut Namespace,
  dependencies: &mut Vec<DependencySpec>,
  violations: &mut Vec<Violation>,
) {
  let mut fetched: HashMap<(&str, Option<&str>), &str> = HashMap::new();
  let mut include_names: HashSet<&str> = HashSet::new();

  for (index, dep) in remotes.iter().enumerate() {
    let entity = entity_label("remote dependency", dep.name.as_deref(), index);
    let name = require_name(dep.name.as_deref(), &entity, violations);
    let source = require(dep.source.as_deref(), &entity, "source", violations);
    if dep.build_method.is_none() {
      violations.push(Violation::MissingField {
        entity: entity.clone(),
        field: "build_method",
      });
    }

    if let (Some(name), Some(source)) = (name, source) {
      let key = (source, dep.version.as_deref());
      if let Some(first) = fetched.get(&key) {
        violations.push(Violation::DuplicateRemote {
          first: first.to_string(),
          second: name.to_string(),
          source_url: source.to_string(),
        });
      } else {
        fetched.insert(key, name);
      }
    }

    if let Some(include_name) = dep.include_name.as_deref()
      && !include_names.insert(include_name)
    {
      violations.push(Violation::DuplicateIncludeName {
        include_name: include_name.to_string(),
      });
    }

    let kind = match (source, dep.build_method) {
      (Some(source), Some(build_method)) => Some(DependencyKind::Remote(RemoteDependency {
        source: source.to_string(),
        version: dep.version.clone(),
        include_name: dep.include_name.clone(),
        include_dirs: dep.include_dirs.clone(),
        build_method,
        build_command: dep.build_command.clone(),
        build_output: dep.build_output.clone(),
        imports: dep.imports.clone(),
      })),
      _ => None,
    };
    push_dependency(name, kind, entity, namespace, dependencies, violations);
  }
}

fn push_dependency(
  name: Option<&str>,
  kind: Option<DependencyKind>,
  entity: String,
  namespace: &mut Namespace,
  dependencies: &mut Vec<DependencySpec>,
  violations: &mut Vec<Violation>,
) {
  let Some(name) = name else {
    return;
  };
  let Some(kind) = kind else {
    namespace.declare(name, NameTarget::Rejected, entity, violations);
    return;
  };

  let id = DependencyId(dependencies.len());
  if namespace.declare(name, NameTarget::Dependency(id), entity, violations) {
    dependencies.push(DependencySpec {
      id,
      name: name.to_string(),
      kind,
    });
  }
}

fn resolve_subproject(
  raw: &RawSubproject,
  index: usize,
  id: SubprojectId,
  root: &Path,
  settings: Option<&BuildSettings>,
  namespace: &mut Namespace,
  violations: &mut Vec<Violation>,
) -> Option<Subproject> {
  let entity = entity_label("subproject", raw.name.as_deref(), index);
  let name = require_name(raw.name.as_deref(), &entity, violations)?;

  if raw.kind.is_none() {
    violations.push(Violation::MissingField {
      entity: entity.clone(),
      field: "type",
    });
  }
  let needs_sources = !matches!(raw.kind, Some(SubprojectKind::HeaderOnly) | None);
  if needs_sources && raw.src_dir.is_none() {
    violations.push(Violation::MissingField {
      entity: entity.clone(),
      field: "src_dir",
    });
  }

  let (Some(kind), true) = (raw.kind, !needs_sources || raw.src_dir.is_some()) else {
    namespace.declare(name, NameTarget::Rejected, entity, violations);
    return None;
  };

  if !namespace.declare(name, NameTarget::Subproject(id), entity, violations) {
    return None;
  }

  Some(Subproject {
    id,
    name: name.to_string(),
    kind,
    src_dir: raw.src_dir.as_deref().map(|dir| root.join(dir)),
    include_dirs: raw.include_dirs.iter().map(|dir| root.join(dir)).collect(),
    references: Vec::new(),
    output_name: raw.output_name.clone().unwrap_or_else(|| name.to_string()),
    compiler: settings.map(|s| s.compiler.clone()).unwrap_or_default(),
    c_standard: settings.map(|s| s.c_standard.clone()).unwrap_or_default(),
    extra_cflags: Vec::new(),
    extra_debug_flags: Vec::new(),
    extra_release_flags: Vec::new(),
    job_cap: None,
  })
}

fn apply_overrides(
  overrides: &[RawOverride],
  namespace: &Namespace,
  subprojects: &mut [Subproject],
  violations: &mut Vec<Violation>,
) {
  let mut seen: HashSet<&str> = HashSet::new();
  let mut reported: HashSet<&str> = HashSet::new();

  for (index, raw) in overrides.iter().enumerate() {
    let entity = entity_label("override", raw.name.as_deref(), index);
    let Some(target) = require(raw.name.as_deref(), &entity, "name", violations) else {
      continue;
    };
    if raw.parallel_jobs == Some(0) {
      violations.push(Violation::ZeroJobs { entity: entity.clone() });
    }

    let id = match namespace.get(target) {
      Some(NameTarget::Subproject(id)) => id,
      Some(NameTarget::Rejected) => continue,
      Some(NameTarget::Dependency(_)) | None => {
        violations.push(Violation::UnknownOverrideTarget {
          target: target.to_string(),
        });
        continue;
      }
    };

    if !seen.insert(target) {
      if reported.insert(target) {
        violations.push(Violation::DuplicateOverride {
          target: target.to_string(),
        });
      }
      continue;
    }

    let Some(sub) = subprojects.get_mut(id.0) else {
      continue;
    };
    if let Some(compiler) = &raw.compiler {
      sub.compiler = compiler.clone();
    }
    if let Some(c_standard) = &raw.c_standard {
      sub.c_standard = c_standard.clone();
    }
    sub.extra_cflags.extend(split_flags(raw.cflags.as_deref()));
    sub.extra_debug_flags.extend(split_flags(raw.debug_flags.as_deref()));
    sub.extra_release_flags.extend(split_flags(raw.release_flags.as_deref()));
    sub.job_cap = raw.parallel_jobs.filter(|&n| n > 0);
    debug!(subproject = %sub.name, job_cap = ?sub.job_cap, "override merged");
  }
}

fn resolve_rules(raw_rules: &[RawCustomBuildRule], root: &Path, violations: &mut Vec<Violation>) -> Vec<CustomBuildRule> {
  let mut rules = Vec::new();
  let mut names: HashSet<&str> = HashSet::new();

  for (index, raw) in raw_rules.iter().enumerate() {
    let entity = entity_label("custom build rule", raw.name.as_deref(), index);
    let name = require_name(raw.name.as_deref(), &entity, violations);
    let src_dir = require(raw.src_dir.as_deref(), &entity, "src_dir", violations);
    let output_dir = require(raw.output_dir.as_deref(), &entity, "output_dir", violations);
    let output_extension = require(raw.output_extension.as_deref(), &entity, "output_extension", violations);
    let command = require(raw.command.as_deref(), &entity, "command", violations);

    if let Some(name) = name
      && !names.insert(name)
    {
      violations.push(Violation::DuplicateRule { name: name.to_string() });
    }

    let trigger_extensions: BTreeSet<String> = raw
      .trigger_extensions
      .iter()
      .map(|ext| normalize_extension(ext))
      .filter(|ext| !ext.is_empty())
      .collect();
    if trigger_extensions.is_empty() {
      violations.push(Violation::NoTriggerExtensions {
        rule: name.unwrap_or(entity.as_str()).to_string(),
      });
    }

    let template = command.and_then(|command| match Template::parse(command) {
      Ok(template) => Some(template),
      Err(source) => {
        violations.push(Violation::InvalidTemplate {
          rule: name.unwrap_or(entity.as_str()).to_string(),
          source,
        });
        None
      }
    });

    if let (Some(name), Some(src_dir), Some(output_dir), Some(output_extension), Some(command)) =
      (name, src_dir, output_dir, output_extension, template)
    {
      rules.push(CustomBuildRule {
        id: RuleId(rules.len()),
        name: name.to_string(),
        description: raw.description.clone(),
        src_dir: root.join(src_dir),
        output_dir: root.join(output_dir),
        trigger_extensions,
        output_extension: normalize_extension(output_extension),
        command,
        rebuild_rule: raw.rebuild_rule.unwrap_or(RebuildRule::IfChanged),
      });
    }
  }

  rules
}

fn entity_label(kind: &str, name: Option<&str>, index: usize) -> String {
  match name {
    Some(name) if !name.trim().is_empty() => format!("{kind} `{name}`"),
    _ => format!("{kind} #{}", index + 1),
  }
}

fn require<'a>(
  value: Option<&'a str>,
  entity: &str,
  field: &'static str,
  violations: &mut Vec<Violation>,
) -> Option<&'a str> {
  match value.map(str::trim) {
    Some(v) if !v.is_empty() => Some(v),
    _ => {
      violations.push(Violation::MissingField {
        entity: entity.to_string(),
        field,
      });
      None
    }
  }
}

fn require_name<'a>(value: Option<&'a str>, entity: &str, violations: &mut Vec<Violation>) -> Option<&'a str> {
  match value.map(str::trim) {
    None => {
      violations.push(Violation::MissingField {
        entity: entity.to_string(),
        field: "name",
      });
      None
    }
    Some("") => {
      violations.push(Violation::EmptyName {
        entity: entity.to_string(),
      });
      None
    }
    Some(name) => Some(name),
  }
}

fn split_flags(flags: Option<&str>) -> Vec<String> {
  flags
    .map(|f| f.split_whitespace().map(str::to_string).collect())
    .unwrap_or_default()
}

fn normalize_extension(ext: &str) -> String {
  ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

use std::fs;

use iceforge_lib::engine::BuildOptions;
use iceforge_lib::execute::CancelFlag;
use iceforge_lib::manifest::{BuildMethod, RawManualDependency, RawPkgConfigDependency, RawRemoteDependency};

use super::common::{Harness, TestProject, binary, ids, library};

const JSON_SOURCE: &str = "https://example.com/json.git";

fn header_only_remote() -> TestProject {
  let mut fixture = TestProject::new(vec![binary("app", &["json"])]);
  fixture.write("app/src/main.c", "#include <dep.h>\nint main(void) { return DEP; }\n");
  fixture.raw.dependencies.remote = vec![RawRemoteDependency {
    name: Some("json".to_string()),
    version: Some("v3.11.2".to_string()),
    source: Some(JSON_SOURCE.to_string()),
    build_method: Some(BuildMethod::HeaderOnly),
    ..Default::default()
  }];
  fixture
}

#[tokio::test]
async fn remote_is_fetched_once_and_its_headers_are_visible() {
  let fixture = header_only_remote();
  let project = fixture.project();
  let harness = Harness::new();

  let first = harness.build(&project).await;
  assert_eq!(first.exit_code(), 0);
  assert_eq!(ids(&first.succeeded), vec!["compile:app:main.c", "fetch:json", "link:app"]);
  assert_eq!(harness.fetcher.take_fetches(), vec![(JSON_SOURCE.to_string(), false)]);

  let include = fixture.root().join("build/deps/json/include");
  let commands = harness.executor.take_commands();
  let compile = commands.iter().find(|c| c.contains(" -c ")).unwrap();
  assert!(compile.contains(&format!("-I{}", include.display())));

  let second = harness.build(&project).await;
  assert!(second.succeeded.is_empty());
  assert!(harness.fetcher.take_fetches().is_empty());
}

#[tokio::test]
async fn version_change_refetches() {
  let mut fixture = header_only_remote();
  let harness = Harness::new();
  harness.build(&fixture.project()).await;
  harness.fetcher.take_fetches();

  fixture.raw.dependencies.remote[0].version = Some("v3.12.0".to_string());
  let report = harness.build(&fixture.project()).await;
  assert!(report.succeeded.iter().any(|id| id.as_str() == "fetch:json"));
  assert_eq!(harness.fetcher.take_fetches().len(), 1);
}

#[tokio::test]
async fn refresh_forces_every_fetch() {
  let fixture = header_only_remote();
  let project = fixture.project();
  let harness = Harness::new();
  harness.build(&project).await;
  harness.fetcher.take_fetches();

  let report = harness.engine.refresh(&project, CancelFlag::new()).await.unwrap();
  assert_eq!(report.exit_code(), 0);
  assert_eq!(ids(&report.succeeded), vec!["fetch:json"]);
  assert_eq!(harness.fetcher.take_fetches(), vec![(JSON_SOURCE.to_string(), true)]);
  assert!(harness.executor.take_commands().iter().all(|c| !c.contains(" -c ")));
}

#[tokio::test]
async fn refreshed_upstream_rebuilds_its_dependents() {
  let fixture = header_only_remote();
  let project = fixture.project();
  let harness = Harness::new();
  harness.build(&project).await;

  harness.fetcher.push_upstream();
  let refreshed = harness.engine.refresh(&project, CancelFlag::new()).await.unwrap();
  assert_eq!(ids(&refreshed.succeeded), vec!["fetch:json"]);
  let header = fixture.root().join("build/deps/json/include/dep.h");
  assert_eq!(fs::read_to_string(header).unwrap(), "#define DEP 2\n");

  let report = harness.build(&project).await;
  assert_eq!(report.exit_code(), 0);
  assert_eq!(ids(&report.succeeded), vec!["compile:app:main.c", "link:app"]);
  assert_eq!(ids(&report.up_to_date), vec!["fetch:json", "flags:json"]);
  assert_eq!(
    harness.fetcher.take_fetches(),
    vec![(JSON_SOURCE.to_string(), false), (JSON_SOURCE.to_string(), true)]
  );
}

#[tokio::test]
async fn refresh_without_upstream_changes_rebuilds_nothing() {
  let fixture = header_only_remote();
  let project = fixture.project();
  let harness = Harness::new();
  harness.build(&project).await;

  harness.engine.refresh(&project, CancelFlag::new()).await.unwrap();
  let report = harness.build(&project).await;
  assert!(report.succeeded.is_empty());
}

#[tokio::test]
async fn package_and_manual_flags_reach_compile_and_link() {
  let mut fixture = TestProject::new(vec![binary("app", &["sdl", "math"])]);
  fixture.write("app/src/main.c", "int main(void) { return 0; }\n");
  fixture.raw.dependencies.pkg_config = vec![RawPkgConfigDependency {
    name: Some("sdl".to_string()),
    pkg_config_query: Some("sdl2".to_string()),
  }];
  fixture.raw.dependencies.manual = vec![RawManualDependency {
    name: Some("math".to_string()),
    cflags: Some("-DUSE_MATH".to_string()),
    ldflags: Some("-lm".to_string()),
  }];
  let harness = Harness::new();

  let report = harness.build(&fixture.project()).await;
  assert_eq!(report.exit_code(), 0);
  assert_eq!(ids(&report.up_to_date), vec!["flags:math", "flags:sdl"]);

  let commands = harness.executor.take_commands();
  let compile = commands.iter().find(|c| c.contains(" -c ")).unwrap();
  let link = commands.iter().find(|c| !c.contains(" -c ")).unwrap();
  assert!(compile.contains("-D_REENTRANT") && compile.contains("-DUSE_MATH"));
  assert!(link.contains("-lSDL2") && link.contains("-lm"));
  assert!(!link.contains("-D_REENTRANT"));
}

#[cfg(unix)]
#[tokio::test]
async fn custom_remote_is_built_and_linked() {
  let mut fixture = TestProject::new(vec![binary("app", &["foo"])]);
  fixture.write("app/src/main.c", "int main(void) { return 0; }\n");
  fixture.raw.dependencies.remote = vec![RawRemoteDependency {
    name: Some("foo".to_string()),
    source: Some("https://example.com/foo.git".to_string()),
    build_method: Some(BuildMethod::Custom),
    build_command: Some("mkdir -p out && printf x > out/libfoo.a".to_string()),
    build_output: Some("out/libfoo.a".to_string()),
    ..Default::default()
  }];
  let project = fixture.project();
  let harness = Harness::new();

  let first = harness.build(&project).await;
  assert_eq!(first.exit_code(), 0);
  assert_eq!(
    ids(&first.succeeded),
    vec!["compile:app:main.c", "dep-build:foo", "fetch:foo", "link:app"]
  );
  let artifact = fixture.root().join("build/deps/foo/out/libfoo.a");
  assert!(artifact.exists());
  let commands = harness.executor.take_commands();
  let link = commands.iter().find(|c| c.contains("/bin/app")).unwrap();
  assert!(link.contains(&artifact.display().to_string()));

  let second = harness.build(&project).await;
  assert!(second.succeeded.is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn refreshed_custom_remote_is_rebuilt_and_relinked() {
  let mut fixture = TestProject::new(vec![library("engine", &["foo"]), binary("app", &["engine"])]);
  fixture.write("engine/src/engine.c", "int engine(void) { return 0; }\n");
  fixture.write("app/src/main.c", "int main(void) { return 0; }\n");
  fixture.raw.dependencies.remote = vec![RawRemoteDependency {
    name: Some("foo".to_string()),
    source: Some("https://example.com/foo.git".to_string()),
    build_method: Some(BuildMethod::Custom),
    build_command: Some("printf x > libfoo.a".to_string()),
    ..Default::default()
  }];
  let project = fixture.project();
  let harness = Harness::new();
  assert_eq!(harness.build(&project).await.exit_code(), 0);

  harness.fetcher.push_upstream();
  harness.engine.refresh(&project, CancelFlag::new()).await.unwrap();
  let report = harness.build(&project).await;
  assert_eq!(report.exit_code(), 0);
  assert_eq!(
    ids(&report.succeeded),
    vec![
      "archive:engine",
      "compile:app:main.c",
      "compile:engine:engine.c",
      "dep-build:foo",
      "link:app"
    ]
  );
}

#[tokio::test]
async fn custom_remote_without_command_is_rejected() {
  let mut fixture = TestProject::new(vec![binary("app", &["foo"])]);
  fixture.write("app/src/main.c", "");
  fixture.raw.dependencies.remote = vec![RawRemoteDependency {
    name: Some("foo".to_string()),
    source: Some("https://example.com/foo.git".to_string()),
    build_method: Some(BuildMethod::Custom),
    ..Default::default()
  }];

  let err = Harness::new()
    .engine
    .build(&fixture.project(), &BuildOptions::default())
    .await
    .unwrap_err();
  assert!(err.to_string().contains("has no build_command"));
}

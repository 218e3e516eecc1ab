use iceforge_lib::consts::EXIT_CONFIG_ERROR;
use iceforge_lib::engine::BuildOptions;
use iceforge_lib::error::{EngineError, ResolutionError};
use iceforge_lib::manifest::{RawOverride, RawPkgConfigDependency};
use iceforge_lib::project::resolve;

use super::common::{Harness, TestProject, binary, ids, library};

#[tokio::test]
async fn cycle_is_rejected_before_anything_runs() {
  let fixture = TestProject::new(vec![library("a", &["b"]), library("b", &["a"])]);
  fixture.write("a/src/a.c", "");
  fixture.write("b/src/b.c", "");
  let harness = Harness::new();

  let err = harness
    .engine
    .build(&fixture.project(), &BuildOptions::default())
    .await
    .unwrap_err();
  assert!(matches!(err, EngineError::Resolution(ResolutionError::Cycle { .. })));
  assert!(err.to_string().starts_with("dependency cycle: "));
  assert_eq!(err.exit_code(), EXIT_CONFIG_ERROR);
  assert!(harness.executor.take_commands().is_empty());
}

#[tokio::test]
async fn dotted_reference_to_undeclared_component_is_rejected() {
  let mut fixture = TestProject::new(vec![binary("app", &["sdl.image"])]);
  fixture.write("app/src/main.c", "");
  fixture.raw.dependencies.pkg_config = vec![RawPkgConfigDependency {
    name: Some("sdl".to_string()),
    pkg_config_query: Some("sdl2".to_string()),
  }];

  let err = Harness::new()
    .engine
    .build(&fixture.project(), &BuildOptions::default())
    .await
    .unwrap_err();
  match err {
    EngineError::Resolution(ResolutionError::UnresolvedComponent {
      subproject, dependency, ..
    }) => {
      assert_eq!(subproject, "app");
      assert_eq!(dependency, "sdl");
    }
    other => panic!("expected an unresolved component, got {other}"),
  }
}

#[test]
fn invalid_manifest_maps_to_config_exit_code() {
  let mut fixture = TestProject::core_game();
  let target = RawOverride {
    name: Some("core".to_string()),
    ..Default::default()
  };
  fixture.raw.overrides = vec![target.clone(), target];

  let err = resolve(&fixture.raw, fixture.root()).unwrap_err();
  assert!(err.to_string().contains("more than one override"));
  assert_eq!(EngineError::from(err).exit_code(), EXIT_CONFIG_ERROR);
}

#[tokio::test]
async fn unknown_subproject_filter_is_rejected() {
  let fixture = TestProject::core_game();
  let err = Harness::new()
    .engine
    .build(
      &fixture.project(),
      &BuildOptions {
        subproject: Some("editor".to_string()),
        ..Default::default()
      },
    )
    .await
    .unwrap_err();
  assert_eq!(err.to_string(), "unknown subproject `editor`");
  assert_eq!(err.exit_code(), EXIT_CONFIG_ERROR);
}

#[tokio::test]
async fn filter_builds_the_subproject_and_what_it_needs() {
  let fixture = TestProject::core_game();
  let project = fixture.project();
  let harness = Harness::new();

  let core_only = harness
    .build_with(
      &project,
      BuildOptions {
        subproject: Some("core".to_string()),
        ..Default::default()
      },
    )
    .await;
  assert_eq!(
    ids(&core_only.succeeded),
    vec!["archive:core", "compile:core:a.c", "compile:core:b.c"]
  );

  let game = harness
    .build_with(
      &project,
      BuildOptions {
        subproject: Some("game".to_string()),
        ..Default::default()
      },
    )
    .await;
  assert_eq!(ids(&game.succeeded), vec!["compile:game:main.c", "link:game"]);
  assert_eq!(game.up_to_date.len(), 3);
}

#[test]
fn plan_runs_nothing() {
  let fixture = TestProject::core_game();
  let harness = Harness::new();

  let graph = harness.engine.plan(&fixture.project(), &BuildOptions::default()).unwrap();
  assert_eq!(graph.len(), 5);
  assert!(harness.executor.take_commands().is_empty());
  assert!(!fixture.root().join(".iceforge").exists());
}

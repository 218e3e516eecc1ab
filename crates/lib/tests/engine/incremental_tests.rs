use std::fs;

use iceforge_lib::engine::BuildOptions;
use iceforge_lib::manifest::RawOverride;
use iceforge_lib::project::Profile;

use super::common::{Harness, TestProject, binary, ids, library};

#[tokio::test]
async fn only_changed_source_and_its_dependents_rebuild() {
  let fixture = TestProject::core_game();
  let project = fixture.project();
  let harness = Harness::new();

  let first = harness.build(&project).await;
  assert_eq!(first.exit_code(), 0);
  assert_eq!(
    ids(&first.succeeded),
    vec![
      "archive:core",
      "compile:core:a.c",
      "compile:core:b.c",
      "compile:game:main.c",
      "link:game"
    ]
  );

  let second = harness.build(&project).await;
  assert_eq!(second.exit_code(), 0);
  assert!(second.succeeded.is_empty());
  assert_eq!(second.up_to_date.len(), 5);
  assert!(harness.executor.take_commands().len() == 5, "only the first build ran commands");

  fixture.write("core/src/a.c", "int a(void) { return 42; }\n");
  let third = harness.build(&project).await;
  assert_eq!(third.exit_code(), 0);
  assert_eq!(ids(&third.succeeded), vec!["archive:core", "compile:core:a.c", "link:game"]);
}

#[tokio::test]
async fn header_change_recompiles_every_unit_that_sees_it() {
  let fixture = TestProject::core_game();
  let project = fixture.project();
  let harness = Harness::new();
  harness.build(&project).await;

  fixture.write("core/include/core.h", "int a(void);\nint b(void);\nint c(void);\n");
  let report = harness.build(&project).await;
  assert_eq!(report.succeeded.len(), 5);
}

#[tokio::test]
async fn missing_output_reruns_only_that_node() {
  let fixture = TestProject::core_game();
  let project = fixture.project();
  let harness = Harness::new();
  harness.build(&project).await;

  fs::remove_file(fixture.root().join("build/debug/obj/core/b.c.o")).unwrap();
  let report = harness.build(&project).await;
  assert_eq!(ids(&report.succeeded), vec!["compile:core:b.c"]);
}

#[tokio::test]
async fn override_flags_rebuild_only_their_subproject_chain() {
  let mut fixture = TestProject::core_game();
  let harness = Harness::new();
  harness.build(&fixture.project()).await;

  fixture.raw.overrides = vec![RawOverride {
    name: Some("core".to_string()),
    cflags: Some("-DCORE_FAST".to_string()),
    ..Default::default()
  }];
  let report = harness.build(&fixture.project()).await;
  assert_eq!(
    ids(&report.succeeded),
    vec!["archive:core", "compile:core:a.c", "compile:core:b.c", "link:game"]
  );
  let commands = harness.executor.take_commands();
  assert!(
    commands
      .iter()
      .filter(|c| c.contains("-DCORE_FAST"))
      .all(|c| c.contains("/obj/core/"))
  );
}

#[tokio::test]
async fn release_outputs_are_separate_from_debug() {
  let fixture = TestProject::core_game();
  let project = fixture.project();
  let harness = Harness::new();
  harness.build(&project).await;

  let release = harness
    .build_with(
      &project,
      BuildOptions {
        profile: Profile::Release,
        ..Default::default()
      },
    )
    .await;
  assert_eq!(release.succeeded.len(), 5);
  assert!(fixture.root().join("build/release/bin/game").exists());
  assert!(fixture.root().join("build/debug/bin/game").exists());
}

#[tokio::test]
async fn fingerprints_persist_in_the_state_directory() {
  let fixture = TestProject::core_game();
  let project = fixture.project();
  Harness::new().build(&project).await;

  let store = fs::read_to_string(fixture.root().join(".iceforge/fingerprints.json")).unwrap();
  assert!(store.contains("\"version\": 1"));
  assert!(store.contains("link:game"));

  // a fresh engine picks up where the last one stopped
  let report = Harness::new().build(&project).await;
  assert!(report.succeeded.is_empty());
}

#[tokio::test]
async fn library_change_rearchives_every_library_above_it() {
  let fixture = TestProject::new(vec![library("base", &[]), library("mid", &["base"]), binary("app", &["mid"])]);
  fixture.write("base/src/base.c", "int base(void) { return 1; }\n");
  fixture.write("mid/src/mid.c", "int mid(void) { return 2; }\n");
  fixture.write("app/src/main.c", "int main(void) { return 0; }\n");
  let project = fixture.project();
  let harness = Harness::new();
  harness.build(&project).await;

  fixture.write("base/src/base.c", "int base(void) { return 3; }\n");
  let report = harness.build(&project).await;
  assert_eq!(report.exit_code(), 0);
  assert_eq!(
    ids(&report.succeeded),
    vec!["archive:base", "archive:mid", "compile:base:base.c", "link:app"]
  );
}

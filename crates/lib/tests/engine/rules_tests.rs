#![cfg(unix)]

use std::collections::BTreeSet;
use std::fs;

use iceforge_lib::engine::BuildOptions;
use iceforge_lib::execute::FailureKind;
use iceforge_lib::manifest::RebuildRule;

use super::common::{Harness, TestProject, ids, rule};

fn with_rule(rebuild: RebuildRule) -> TestProject {
  let mut fixture = TestProject::new(vec![]);
  fixture.write("assets/logo.txt", "logo\n");
  fixture.write("assets/fonts/mono.txt", "mono\n");
  fixture.write("assets/ignored.bin", "");
  fixture.raw.custom_build_rules = vec![rule("assets", "txt", "cp $in $out", rebuild)];
  fixture
}

fn triggering(name: &str) -> BuildOptions {
  BuildOptions {
    triggers: BTreeSet::from([name.to_string()]),
    ..Default::default()
  }
}

#[tokio::test]
async fn if_changed_rule_runs_only_for_changed_inputs() {
  let fixture = with_rule(RebuildRule::IfChanged);
  let project = fixture.project();
  let harness = Harness::new();

  let first = harness.build(&project).await;
  assert_eq!(
    ids(&first.succeeded),
    vec!["rule:assets:fonts/mono.txt", "rule:assets:logo.txt"]
  );
  assert_eq!(
    fs::read_to_string(fixture.root().join("out/assets/fonts/mono.txt.out")).unwrap(),
    "mono\n"
  );

  let second = harness.build(&project).await;
  assert!(second.succeeded.is_empty());

  fixture.write("assets/logo.txt", "new logo\n");
  let third = harness.build(&project).await;
  assert_eq!(ids(&third.succeeded), vec!["rule:assets:logo.txt"]);
  assert_eq!(
    fs::read_to_string(fixture.root().join("out/assets/logo.txt.out")).unwrap(),
    "new logo\n"
  );
}

#[tokio::test]
async fn always_rule_runs_every_time() {
  let fixture = with_rule(RebuildRule::Always);
  let project = fixture.project();
  let harness = Harness::new();

  harness.build(&project).await;
  let second = harness.build(&project).await;
  assert_eq!(second.succeeded.len(), 2);
}

#[tokio::test]
async fn on_trigger_rule_waits_for_its_trigger() {
  let fixture = with_rule(RebuildRule::OnTrigger);
  let project = fixture.project();
  let harness = Harness::new();

  let untriggered = harness.build(&project).await;
  assert!(untriggered.succeeded.is_empty());
  assert_eq!(untriggered.up_to_date.len(), 2);
  assert!(!fixture.root().join("out/assets/logo.txt.out").exists());

  let other = harness.build_with(&project, triggering("shaders")).await;
  assert!(other.succeeded.is_empty());

  let triggered = harness.build_with(&project, triggering("assets")).await;
  assert_eq!(triggered.succeeded.len(), 2);
  assert!(fixture.root().join("out/assets/logo.txt.out").exists());
}

#[tokio::test]
async fn failing_rule_reports_its_exit_code() {
  let mut fixture = with_rule(RebuildRule::IfChanged);
  fixture.raw.custom_build_rules = vec![rule("assets", "txt", "echo broken $in >&2; exit 3", RebuildRule::IfChanged)];
  let harness = Harness::new();

  let report = harness.build(&fixture.project()).await;
  assert_eq!(report.exit_code(), 1);
  assert_eq!(report.failed.len(), 2);
  let failure = report.failure("rule:assets:logo.txt").unwrap();
  assert_eq!(failure.kind, FailureKind::CustomRule);
  assert_eq!(failure.exit_code, Some(3));
  assert!(failure.message.contains("broken"));
}

#[tokio::test]
async fn subproject_filter_leaves_rules_alone() {
  let mut fixture = TestProject::core_game();
  fixture.write("assets/logo.txt", "logo\n");
  fixture.raw.custom_build_rules = vec![rule("assets", "txt", "cp $in $out", RebuildRule::Always)];
  let harness = Harness::new();

  let report = harness
    .build_with(
      &fixture.project(),
      BuildOptions {
        subproject: Some("core".to_string()),
        ..Default::default()
      },
    )
    .await;
  assert!(report.succeeded.iter().all(|id| !id.as_str().starts_with("rule:")));
}

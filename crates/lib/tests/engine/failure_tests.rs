use std::sync::Arc;

use iceforge_lib::engine::Engine;
use iceforge_lib::execute::{FailureKind, ShellExecutor, SkipCause};
use iceforge_lib::graph::NodeId;
use iceforge_lib::manifest::RawPkgConfigDependency;

use super::common::{Harness, MockFetcher, MockPackages, TestProject, binary, ids, library};

/// `alpha` (library), `beta` (binary on alpha), `gamma` (independent binary).
fn three_subprojects() -> TestProject {
  let fixture = TestProject::new(vec![library("alpha", &[]), binary("beta", &["alpha"]), binary("gamma", &[])]);
  fixture.write("alpha/src/a.c", "int a(void) { return 1; }\n");
  fixture.write("beta/src/main.c", "int main(void) { return 0; }\n");
  fixture.write("gamma/src/main.c", "int main(void) { return 0; }\n");
  fixture
}

#[tokio::test]
async fn failure_skips_dependents_and_spares_independent_work() {
  let fixture = three_subprojects();
  let project = fixture.project();
  let harness = Harness::new();
  harness.executor.fail_output("/obj/alpha/");

  let report = harness.build(&project).await;
  assert_eq!(report.exit_code(), 1);

  assert_eq!(report.failed.len(), 1);
  let failure = &report.failed[0];
  assert_eq!(failure.node.as_str(), "compile:alpha:a.c");
  assert_eq!(failure.kind, FailureKind::Compile);
  assert_eq!(failure.exit_code, Some(1));
  assert!(failure.message.contains("injected failure"));
  assert!(failure.command.contains(" -c "));

  let root = SkipCause::FailedDependency(NodeId::from("compile:alpha:a.c"));
  assert_eq!(report.skip_cause("archive:alpha"), Some(&root));
  assert_eq!(report.skip_cause("link:beta"), Some(&root));
  assert_eq!(report.skipped.len(), 2);

  assert_eq!(
    ids(&report.succeeded),
    vec!["compile:beta:main.c", "compile:gamma:main.c", "link:gamma"]
  );
}

#[tokio::test]
async fn failed_nodes_retry_on_the_next_run() {
  let fixture = three_subprojects();
  let project = fixture.project();
  let harness = Harness::new();
  harness.executor.fail_output("/obj/alpha/");
  harness.build(&project).await;

  harness.executor.clear_failures();
  let report = harness.build(&project).await;
  assert_eq!(report.exit_code(), 0);
  assert_eq!(
    ids(&report.succeeded),
    vec!["archive:alpha", "compile:alpha:a.c", "link:beta"]
  );
}

#[tokio::test]
async fn archive_failure_is_reported_as_link() {
  let fixture = three_subprojects();
  let harness = Harness::new();
  harness.executor.fail_output("libalpha.a");

  let report = harness.build(&fixture.project()).await;
  assert_eq!(report.failure("archive:alpha").unwrap().kind, FailureKind::Link);
  assert!(report.skip_cause("link:beta").is_some());
}

#[tokio::test]
async fn missing_compiler_fails_without_exit_code() {
  let mut fixture = three_subprojects();
  if let Some(build) = fixture.raw.build.as_mut() {
    build.compiler = Some("iceforge-test-missing-cc".to_string());
  }
  let engine = Engine::new(Arc::new(ShellExecutor), MockFetcher::new(), Arc::new(MockPackages));

  let report = engine.build(&fixture.project(), &Default::default()).await.unwrap();
  assert_eq!(report.exit_code(), 1);
  let failure = report.failure("compile:gamma:main.c").unwrap();
  assert_eq!(failure.exit_code, None);
  assert!(failure.message.starts_with("failed to start"));
}

#[tokio::test]
async fn unknown_package_fails_only_its_users() {
  let mut fixture = TestProject::new(vec![binary("app", &["gtk"]), binary("tool", &[])]);
  fixture.write("app/src/main.c", "");
  fixture.write("tool/src/main.c", "");
  fixture.raw.dependencies.pkg_config = vec![RawPkgConfigDependency {
    name: Some("gtk".to_string()),
    pkg_config_query: Some("gtk4".to_string()),
  }];
  let harness = Harness::new();

  let report = harness.build(&fixture.project()).await;
  assert_eq!(report.exit_code(), 1);
  let failure = report.failure("flags:gtk").unwrap();
  assert_eq!(failure.kind, FailureKind::Fetch);
  assert!(failure.message.contains("gtk4"));
  assert!(report.skip_cause("compile:app:main.c").is_some());
  assert!(report.skip_cause("link:app").is_some());
  assert_eq!(ids(&report.succeeded), vec!["compile:tool:main.c", "link:tool"]);
}

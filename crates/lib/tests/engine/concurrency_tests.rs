use std::time::Duration;

use iceforge_lib::engine::BuildOptions;
use iceforge_lib::manifest::RawOverride;

use super::common::{Harness, TestProject, library};

fn with_sources(fixture: &TestProject, subproject: &str, count: usize) {
  for i in 0..count {
    fixture.write(&format!("{subproject}/src/unit{i:02}.c"), &format!("int unit{i}(void) {{ return {i}; }}\n"));
  }
}

#[tokio::test]
async fn global_cap_bounds_running_nodes() {
  for jobs in [1, 2, 8] {
    let fixture = TestProject::new(vec![library("big", &[])]);
    with_sources(&fixture, "big", 12);
    let harness = Harness::new();
    harness.executor.set_delay(Duration::from_millis(15));

    let report = harness
      .build_with(
        &fixture.project(),
        BuildOptions {
          jobs: Some(jobs),
          ..Default::default()
        },
      )
      .await;

    assert!(report.is_success());
    assert_eq!(report.succeeded.len(), 13);
    let peak = harness.executor.total_peak();
    assert!(peak >= 1 && peak <= jobs, "jobs={jobs} but {peak} nodes ran at once");
  }
}

#[tokio::test]
async fn manifest_parallel_jobs_is_the_default_cap() {
  let mut fixture = TestProject::new(vec![library("big", &[])]);
  with_sources(&fixture, "big", 8);
  if let Some(build) = fixture.raw.build.as_mut() {
    build.parallel_jobs = Some(2);
  }
  let harness = Harness::new();
  harness.executor.set_delay(Duration::from_millis(15));

  let report = harness.build(&fixture.project()).await;
  assert!(report.is_success());
  assert!(harness.executor.total_peak() <= 2);
}

#[tokio::test]
async fn override_cap_applies_to_its_subproject_only() {
  let mut fixture = TestProject::new(vec![library("slow", &[]), library("fast", &[])]);
  with_sources(&fixture, "slow", 6);
  with_sources(&fixture, "fast", 6);
  fixture.raw.overrides = vec![RawOverride {
    name: Some("slow".to_string()),
    parallel_jobs: Some(1),
    ..Default::default()
  }];
  let harness = Harness::new();
  harness.executor.set_delay(Duration::from_millis(15));

  let report = harness
    .build_with(
      &fixture.project(),
      BuildOptions {
        jobs: Some(8),
        ..Default::default()
      },
    )
    .await;

  assert!(report.is_success());
  assert_eq!(harness.executor.peak("slow"), 1);
  assert!(harness.executor.peak("fast") <= 8);
}

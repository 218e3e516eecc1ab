use iceforge_lib::engine::BuildOptions;
use iceforge_lib::execute::{CancelFlag, SkipCause};

use super::common::{Harness, TestProject, library};

fn four_sources() -> TestProject {
  let fixture = TestProject::new(vec![library("big", &[])]);
  for name in ["a", "b", "c", "d"] {
    fixture.write(&format!("big/src/{name}.c"), &format!("int {name}(void) {{ return 0; }}\n"));
  }
  fixture
}

#[tokio::test]
async fn cancelled_before_start_runs_nothing() {
  let fixture = four_sources();
  let harness = Harness::new();
  let cancel = CancelFlag::new();
  cancel.cancel();

  let report = harness
    .build_with(
      &fixture.project(),
      BuildOptions {
        cancel,
        ..Default::default()
      },
    )
    .await;

  assert!(report.cancelled);
  assert_eq!(report.exit_code(), 130);
  assert!(report.succeeded.is_empty());
  assert_eq!(report.skipped.len(), 5);
  assert!(report.skipped.iter().all(|s| s.cause == SkipCause::Cancelled));
  assert!(harness.executor.take_commands().is_empty());
}

#[tokio::test]
async fn cancel_mid_build_lets_running_work_finish() {
  let fixture = four_sources();
  let project = fixture.project();
  let harness = Harness::new();
  let cancel = CancelFlag::new();
  harness.executor.cancel_on_first(cancel.clone());

  let report = harness
    .build_with(
      &project,
      BuildOptions {
        jobs: Some(1),
        cancel,
        ..Default::default()
      },
    )
    .await;

  assert_eq!(report.exit_code(), 130);
  assert_eq!(report.succeeded.len(), 1);
  assert_eq!(report.skipped.len(), 4);
  assert!(report.skipped.iter().all(|s| s.cause == SkipCause::Cancelled));
  assert_eq!(report.total(), 5);

  // the finished compile was recorded before exit
  let resumed = harness.build(&project).await;
  assert_eq!(resumed.exit_code(), 0);
  assert_eq!(resumed.up_to_date.len(), 1);
  assert_eq!(resumed.succeeded.len(), 4);
}

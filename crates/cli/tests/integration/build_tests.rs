#![cfg(unix)]

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn second_build_is_a_noop() {
  let env = TestEnv::core_game();

  env
    .iceforge_cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("Build complete"))
    .stdout(predicate::str::contains("Built: 5"));
  assert!(env.path().join("build/debug/bin/game").exists());
  assert!(env.path().join("build/debug/lib/libcore.a").exists());
  assert!(env.path().join(".iceforge/fingerprints.json").exists());

  env
    .iceforge_cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("Built: 0"))
    .stdout(predicate::str::contains("Up to date: 5"));
}

#[test]
fn edited_source_rebuilds_its_chain() {
  let env = TestEnv::core_game();
  env.iceforge_cmd().arg("build").assert().success();

  env.write_file("core/src/a.c", "int a(void) { return 42; }\n");
  env
    .iceforge_cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("Built: 3"))
    .stdout(predicate::str::contains("Up to date: 2"));
}

#[test]
fn release_profile_builds_into_its_own_directory() {
  let env = TestEnv::core_game();

  env.iceforge_cmd().args(["build", "--release"]).assert().success();
  assert!(env.path().join("build/release/bin/game").exists());
  assert!(!env.path().join("build/debug").exists());
}

#[test]
fn compile_failure_exits_one_with_diagnostics() {
  let env = TestEnv::core_game();
  env.write_manifest("failing-cc", "");

  env
    .iceforge_cmd()
    .arg("build")
    .assert()
    .code(1)
    .stdout(predicate::str::contains("Skipped: 2"))
    .stderr(predicate::str::contains("compile:core:a.c failed (compile, exited with 1)"))
    .stderr(predicate::str::contains("error: expected declaration"))
    .stderr(predicate::str::contains("Build failed"));
}

#[test]
fn cycle_exits_with_config_status() {
  let env = TestEnv::new();
  env.write_file(
    "iceforge.toml",
    r#"
[build]
version = "0.1.0"
c_standard = "c11"
compiler = "cc"

[[subprojects]]
name = "a"
type = "library"
src_dir = "a"
dependencies = ["b"]

[[subprojects]]
name = "b"
type = "library"
src_dir = "b"
dependencies = ["a"]
"#,
  );

  env
    .iceforge_cmd()
    .arg("build")
    .assert()
    .code(2)
    .stderr(predicate::str::contains("dependency cycle"));
}

#[test]
fn subproject_filter_builds_only_what_it_needs() {
  let env = TestEnv::core_game();

  env
    .iceforge_cmd()
    .args(["build", "--subproject", "core"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Built: 3"));
  assert!(!env.path().join("build/debug/bin/game").exists());

  env
    .iceforge_cmd()
    .args(["build", "--subproject", "nope"])
    .assert()
    .code(2)
    .stderr(predicate::str::contains("unknown subproject `nope`"));
}

#[test]
fn on_trigger_rule_runs_when_named() {
  let env = TestEnv::core_game();
  env.write_file("assets/logo.txt", "logo\n");
  env.write_manifest(
    "cc",
    r#"
[[custom_build_rules]]
name = "assets"
src_dir = "assets"
output_dir = "build/assets"
trigger_extensions = ["txt"]
output_extension = "copy"
command = "cp $in $out"
rebuild_rule = "on-trigger"
"#,
  );
  let output = env.path().join("build/assets/logo.txt.copy");

  env.iceforge_cmd().arg("build").assert().success();
  assert!(!output.exists());

  env
    .iceforge_cmd()
    .args(["build", "--trigger", "assets"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Built: 1"));
  assert_eq!(std::fs::read_to_string(output).unwrap(), "logo\n");
}

#[test]
fn json_output_is_valid() {
  let env = TestEnv::core_game();

  let output = env.iceforge_cmd().args(["build", "-o", "json"]).output().unwrap();
  assert!(output.status.success());
  let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(report["exit_code"], 0);
  assert_eq!(report["succeeded"].as_array().unwrap().len(), 5);
  assert!(report["failed"].as_array().unwrap().is_empty());
}

#[test]
fn jobs_from_environment_must_be_numeric() {
  let env = TestEnv::core_game();

  env
    .iceforge_cmd()
    .arg("build")
    .env("ICEFORGE_JOBS", "many")
    .assert()
    .code(2)
    .stderr(predicate::str::contains("ICEFORGE_JOBS must be a number"));

  env
    .iceforge_cmd()
    .arg("build")
    .env("ICEFORGE_JOBS", "1")
    .assert()
    .success();
}

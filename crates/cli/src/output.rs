//! CLI output formatting utilities.
//!
//! Provides consistent formatting for terminal output: colored status lines,
//! duration formatting and the end-of-build report.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};
use serde::Serialize;

use iceforge_lib::execute::BuildReport;
use iceforge_lib::graph::NodeId;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
}

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let millis = duration.subsec_millis();

  if secs >= 60 {
    let mins = secs / 60;
    let remaining_secs = secs % 60;
    format!("{}m {}s", mins, remaining_secs)
  } else if secs > 0 {
    format!("{}.{:02}s", secs, millis / 10)
  } else {
    format!("{}ms", millis)
  }
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

#[derive(Serialize)]
struct ReportJson<'a> {
  exit_code: i32,
  cancelled: bool,
  succeeded: &'a [NodeId],
  up_to_date: &'a [NodeId],
  failed: Vec<FailureJson<'a>>,
  skipped: Vec<SkipJson<'a>>,
  duration_ms: u128,
}

#[derive(Serialize)]
struct FailureJson<'a> {
  node: &'a NodeId,
  kind: String,
  command: &'a str,
  exit_code: Option<i32>,
  message: &'a str,
}

#[derive(Serialize)]
struct SkipJson<'a> {
  node: &'a NodeId,
  cause: String,
}

/// Print what a build or refresh did, in the requested format.
pub fn print_report(report: &BuildReport, elapsed: Duration, output: OutputFormat) -> anyhow::Result<()> {
  if output.is_json() {
    return print_json(&ReportJson {
      exit_code: report.exit_code(),
      cancelled: report.cancelled,
      succeeded: &report.succeeded,
      up_to_date: &report.up_to_date,
      failed: report
        .failed
        .iter()
        .map(|f| FailureJson {
          node: &f.node,
          kind: f.kind.to_string(),
          command: &f.command,
          exit_code: f.exit_code,
          message: &f.message,
        })
        .collect(),
      skipped: report
        .skipped
        .iter()
        .map(|s| SkipJson {
          node: &s.node,
          cause: s.cause.to_string(),
        })
        .collect(),
      duration_ms: elapsed.as_millis(),
    });
  }

  for failure in &report.failed {
    let status = failure
      .exit_code
      .map_or_else(|| "did not run".to_string(), |code| format!("exited with {code}"));
    print_error(&format!("{} failed ({}, {status})", failure.node, failure.kind));
    eprintln!("    {} {}", symbols::ARROW, failure.command);
    for line in failure.message.lines() {
      eprintln!("    {line}");
    }
  }

  println!();
  if report.cancelled {
    print_warning("Build interrupted");
  } else if report.is_success() {
    print_success("Build complete");
  } else {
    print_error("Build failed");
  }
  print_stat("Built", &report.succeeded.len().to_string());
  print_stat("Up to date", &report.up_to_date.len().to_string());
  if !report.failed.is_empty() {
    print_stat("Failed", &report.failed.len().to_string());
  }
  if !report.skipped.is_empty() {
    print_stat("Skipped", &report.skipped.len().to_string());
  }
  print_stat("Duration", &format_duration(elapsed));

  Ok(())
}

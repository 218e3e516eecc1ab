//! iceforge-lib: build orchestration for multi-subproject C projects
//!
//! The pipeline runs strictly downward:
//! - `project`: validate a [`manifest::RawManifest`] into a linked [`project::Project`]
//! - `deps`: plan remote, pkg-config and manual dependencies
//! - `graph`: expand everything into a DAG of build units
//! - `stale`: fingerprint nodes and decide what is out of date
//! - `execute`: run stale nodes under bounded concurrency
//!
//! [`engine::Engine`] wires these together for callers.

pub mod consts;
pub mod deps;
pub mod engine;
pub mod error;
pub mod execute;
pub mod graph;
pub mod manifest;
pub mod project;
pub mod stale;
pub mod template;
pub mod util;

pub use engine::{BuildOptions, Engine};
pub use error::{ConfigError, EngineError, ResolutionError};

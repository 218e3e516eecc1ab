//! Manifest Resolver: raw manifest in, linked [`Project`] out.
//!
//! Resolution checks every entity for its required fields, enforces a single
//! namespace shared by dependencies and subprojects, turns name references
//! into arena ids and merges each override into the one subproject it targets.
//! All violations are collected before failing.

mod resolve;
mod types;

pub use resolve::resolve;
pub use types::*;

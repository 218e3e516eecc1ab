//! Manifest source types.
//!
//! The engine never parses manifest files itself. Callers deserialize the
//! `iceforge.toml` tables into [`RawManifest`] (every type here derives serde)
//! and hand it to [`crate::project::resolve`].
//!
//! ```toml
//! [build]
//! version = "0.1.0"
//! c_standard = "c17"
//! compiler = "cc"
//!
//! [[subprojects]]
//! name = "core"
//! type = "library"
//! src_dir = "core/src"
//! include_dirs = ["core/include"]
//!
//! [[subprojects]]
//! name = "game"
//! type = "binary"
//! src_dir = "game/src"
//! dependencies = ["core"]
//! ```

mod types;

pub use types::*;

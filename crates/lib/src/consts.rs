//! Constants shared between the engine and its callers.

/// Manifest file name looked up in the project root.
pub const MANIFEST_FILENAME: &str = "iceforge.toml";

/// Per-project state directory, relative to the project root.
pub const STATE_DIR: &str = ".iceforge";

/// Fingerprint cache file inside [`STATE_DIR`].
pub const FINGERPRINT_FILENAME: &str = "fingerprints.json";

/// Default build output directory, relative to the project root.
pub const DEFAULT_BUILD_DIR: &str = "build";

/// Default static archiver.
pub const DEFAULT_ARCHIVER: &str = "ar";

/// Directory under the build dir holding remote dependency checkouts.
pub const DEPS_DIR: &str = "deps";

/// File extensions compiled as translation units.
pub const SOURCE_EXTENSIONS: &[&str] = &["c", "cc", "cpp", "cxx"];

/// File extensions tracked as headers for compile fingerprints.
pub const HEADER_EXTENSIONS: &[&str] = &["h", "hh", "hpp", "hxx", "inc"];

/// Number of stderr lines kept per failed node.
pub const STDERR_TAIL_LINES: usize = 20;

/// Environment variable overriding the global job cap.
pub const JOBS_ENV: &str = "ICEFORGE_JOBS";

/// Exit status: everything built or up to date.
pub const EXIT_SUCCESS: i32 = 0;

/// Exit status: at least one node failed during execution.
pub const EXIT_BUILD_FAILED: i32 = 1;

/// Exit status: the manifest was rejected before any work was scheduled.
pub const EXIT_CONFIG_ERROR: i32 = 2;

/// Exit status: the build was interrupted.
pub const EXIT_INTERRUPTED: i32 = 130;

//! Vendor Patcher: verified source patching for vendored build trees
//!
//! Applies named regex-and-template rewrites to files in a checked-out
//! third-party source tree, and refuses to report success unless each rewrite
//! actually changed its target.
//!
//! # Architecture
//!
//! A [`PatchSpec`] is compiled once (pattern, replacement template, target) and
//! is immutable afterwards. [`transform`] locates the first match and expands
//! the template; it is pure. [`apply`] reads the live file, runs the
//! transform, and persists the result atomically only when the text changed.
//!
//! # Safety
//!
//! - Malformed patterns and templates naming undeclared groups are rejected
//!   when the spec is built
//! - A patch that matches nothing, or rewrites to identical text, is a failure
//! - Atomic file writes (tempfile + fsync + rename), permissions preserved
//! - Targets are confined to an explicit source tree root
//!
//! # Example
//!
//! ```no_run
//! use vendor_patcher::{apply, PatchSpec};
//!
//! let spec = PatchSpec::new(
//!     "0009-memfd-name-jit-cache",
//!     "/src/frida-core/lib/base/linux.vala",
//!     r"(Linux\.syscall\s*\(\s*LinuxSyscall\.MEMFD_CREATE\s*,\s*)(\w+)(\s*,\s*flags\s*\))",
//!     r#"$1"jit-cache"$3"#,
//! )?;
//!
//! let result = apply(&spec)?;
//! if !result.matched {
//!     eprintln!("{}", result.error_detail.unwrap_or_default());
//!     std::process::exit(1);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod patch;
pub mod safety;
pub mod series;
pub mod template;
pub mod transform;
pub mod writer;

// Re-exports
pub use config::{
    check_source_version, load_from_path, load_from_str, load_series, ConfigError, OnMultiple,
    PatchConfig, PatchSeries, VersionCheck, VersionError,
};
pub use patch::{PatchError, PatchSpec, Verification};
pub use safety::{SafetyError, SourceTree};
pub use series::{
    apply_series, check_series, preview_series, PatchOutcome, SeriesCheck, SeriesReport,
};
pub use transform::{transform, TransformError, Transformed};
pub use writer::{apply, apply_with, check, ApplyError, ApplyResult, AtomicPersist, Persist};

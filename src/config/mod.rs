pub mod loader;
pub mod schema;
pub mod version;

pub use loader::{
    discover_patch_files, load_from_path, load_from_str, load_series, ConfigError, PatchSeries,
    SkippedPatch,
};
pub use schema::{
    HashAlgorithm, Metadata, OnMultiple, PatchConfig, PatchDefinition, ValidationError,
    ValidationIssue, Verify,
};
pub use version::{check_source_version, VersionCheck, VersionError};

//! Loading patch files and turning them into a runnable series.
//!
//! A series is assembled in one pass before anything is applied: every file is
//! parsed, validated, gated on the source version and compiled against the
//! source tree. Any error here means no patch in the series runs.

use crate::config::schema::{PatchConfig, ValidationError};
use crate::config::version::{check_source_version, VersionCheck, VersionError};
use crate::patch::{PatchError, PatchSpec};
use crate::safety::SourceTree;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read patch file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed patch file{}: {source}", located(.path))]
    Toml {
        path: Option<PathBuf>,
        #[source]
        source: toml_edit::de::Error,
    },

    #[error("invalid patch file{}: {source}", located(.path))]
    Validation {
        path: Option<PathBuf>,
        #[source]
        source: ValidationError,
    },

    #[error("cannot list patch directory {}: {source}", dir.display())]
    Discovery {
        dir: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("no .toml patch files in {}", dir.display())]
    NoPatchFiles { dir: PathBuf },

    #[error("patch file {}: {source}", path.display())]
    Version {
        path: PathBuf,
        #[source]
        source: VersionError,
    },

    #[error("patch file {}: {source}", path.display())]
    Patch {
        path: PathBuf,
        #[source]
        source: PatchError,
    },

    #[error("unknown patch id(s): {}", ids.join(", "))]
    UnknownIds { ids: Vec<String> },
}

fn located(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|path| format!(" {}", path.display()))
        .unwrap_or_default()
}

fn parse(input: &str, path: Option<&Path>) -> Result<PatchConfig, ConfigError> {
    let config: PatchConfig = toml_edit::de::from_str(input).map_err(|source| ConfigError::Toml {
        path: path.map(Path::to_path_buf),
        source,
    })?;
    config
        .validate()
        .map_err(|source| ConfigError::Validation {
            path: path.map(Path::to_path_buf),
            source,
        })?;
    Ok(config)
}

/// Parse and validate patch-file TOML held in memory.
pub fn load_from_str(input: &str) -> Result<PatchConfig, ConfigError> {
    parse(input, None)
}

/// Parse and validate one patch file; errors name the file.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<PatchConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse(&contents, Some(path))?;
    debug!(
        file = %path.display(),
        patches = config.patches.len(),
        "loaded patch file"
    );
    Ok(config)
}

/// Expand inputs into patch files, preserving their order.
///
/// A directory contributes its top-level `*.toml` files sorted by name, so
/// numbered files (`0001-...`, `0002-...`) run in sequence. Other inputs are
/// taken as files as-is.
pub fn discover_patch_files(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, ConfigError> {
    let mut files = Vec::new();

    for input in inputs {
        if !input.is_dir() {
            files.push(input.clone());
            continue;
        }

        let mut found = Vec::new();
        for entry in WalkDir::new(input).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|source| ConfigError::Discovery {
                dir: input.clone(),
                source,
            })?;
            if entry.file_type().is_file()
                && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
            {
                found.push(entry.into_path());
            }
        }
        found.sort();

        if found.is_empty() {
            return Err(ConfigError::NoPatchFiles { dir: input.clone() });
        }
        files.extend(found);
    }

    Ok(files)
}

/// A patch left out of the series because its file's version range excludes
/// the checked-out source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPatch {
    pub id: String,
    pub gate: VersionCheck,
}

/// Compiled patches ready to run, in series order.
#[derive(Debug, Default)]
pub struct PatchSeries {
    pub specs: Vec<PatchSpec>,
    pub skipped: Vec<SkippedPatch>,
}

impl PatchSeries {
    /// Keep only the patches named in `ids`.
    ///
    /// An id that no loaded patch carries (run or skipped) is an error, so a
    /// typo on the command line cannot silently select nothing.
    pub fn retain_ids(&mut self, ids: &[String]) -> Result<(), ConfigError> {
        if ids.is_empty() {
            return Ok(());
        }

        let known: HashSet<&str> = self
            .specs
            .iter()
            .map(PatchSpec::id)
            .chain(self.skipped.iter().map(|skip| skip.id.as_str()))
            .collect();
        let unknown: Vec<String> = ids
            .iter()
            .filter(|id| !known.contains(id.as_str()))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(ConfigError::UnknownIds { ids: unknown });
        }

        self.specs.retain(|spec| ids.iter().any(|id| id == spec.id()));
        self.skipped.retain(|skip| ids.contains(&skip.id));
        Ok(())
    }
}

/// Load every patch file under `inputs` and compile it against `tree`.
///
/// Files whose `version_range` excludes `source_version` contribute skipped
/// patches instead of specs. A range with no known source version is not
/// evaluated; its patches run and a warning is logged.
pub fn load_series(
    inputs: &[PathBuf],
    tree: &SourceTree,
    source_version: Option<&str>,
) -> Result<PatchSeries, ConfigError> {
    let mut series = PatchSeries::default();

    for path in discover_patch_files(inputs)? {
        let config = load_from_path(&path)?;
        let gate = check_source_version(source_version, config.meta.version_range.as_deref())
            .map_err(|source| ConfigError::Version {
                path: path.clone(),
                source,
            })?;
        // Compiled even when skipped: a broken pattern is reported on every release line.
        let specs = config.specs(tree).map_err(|source| ConfigError::Patch {
            path: path.clone(),
            source,
        })?;

        match &gate {
            VersionCheck::Unsatisfied { .. } => {
                info!(file = %path.display(), reason = %gate, "skipping patch file");
                series
                    .skipped
                    .extend(specs.iter().map(|spec| SkippedPatch {
                        id: spec.id().to_string(),
                        gate: gate.clone(),
                    }));
                continue;
            }
            VersionCheck::Unknown { range } => {
                warn!(
                    file = %path.display(),
                    range = %range,
                    "no source version given; version_range not evaluated"
                );
            }
            VersionCheck::Unconstrained | VersionCheck::Satisfied => {}
        }

        series.specs.extend(specs);
    }

    Ok(series)
}

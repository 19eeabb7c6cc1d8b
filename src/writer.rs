//! Verified writer: apply a [`PatchSpec`] to the live file and refuse to report
//! success unless the file actually changed.

use crate::patch::PatchSpec;
use crate::transform::transform;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Outcome of running one patch.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "ApplyResult should be checked: matched == false means the patch did not take effect"]
pub struct ApplyResult {
    pub matched: bool,
    /// Length of the persisted text, 0 when nothing was written
    pub bytes_written: usize,
    pub error_detail: Option<String>,
}

impl ApplyResult {
    fn applied(bytes_written: usize) -> Self {
        Self {
            matched: true,
            bytes_written,
            error_detail: None,
        }
    }

    fn not_applied(detail: String) -> Self {
        Self {
            matched: false,
            bytes_written: 0,
            error_detail: Some(detail),
        }
    }

    pub fn is_success(&self) -> bool {
        self.matched
    }
}

#[derive(Error, Debug)]
pub enum ApplyError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ApplyError {
    pub fn path(&self) -> &Path {
        match self {
            ApplyError::Read { path, .. } | ApplyError::Write { path, .. } => path,
        }
    }
}

/// What [`apply`] would do, computed without writing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub original: String,
    /// New file contents; `None` when the patch would not take effect
    pub patched: Option<String>,
    pub result: ApplyResult,
}

/// Replaces a file's contents in one step.
pub trait Persist {
    fn persist(&self, path: &Path, content: &[u8]) -> std::io::Result<()>;
}

/// Tempfile in the target's directory, fsync, then rename over the target.
#[derive(Debug, Clone, Copy, Default)]
pub struct AtomicPersist;

impl Persist for AtomicPersist {
    fn persist(&self, path: &Path, content: &[u8]) -> std::io::Result<()> {
        atomic_write(path, content)
    }
}

/// Apply `spec` to the current on-disk contents of its target.
///
/// Returns `matched == false` (and touches nothing) when the pattern is absent
/// or the rewrite would leave the file unchanged.
pub fn apply(spec: &PatchSpec) -> Result<ApplyResult, ApplyError> {
    apply_with(spec, &AtomicPersist)
}

/// [`apply`] with an explicit persistence strategy.
pub fn apply_with(spec: &PatchSpec, persist: &dyn Persist) -> Result<ApplyResult, ApplyError> {
    let Preview {
        patched, result, ..
    } = check(spec)?;

    let Some(patched) = patched else {
        error!(
            patch = %spec.id(),
            file = %spec.target_path().display(),
            detail = result.error_detail.as_deref().unwrap_or_default(),
            "patch did not take effect"
        );
        return Ok(result);
    };

    let path = spec.target_path();
    persist
        .persist(path, patched.as_bytes())
        .map_err(|source| ApplyError::Write {
            path: path.to_path_buf(),
            source,
        })?;

    info!(
        patch = %spec.id(),
        file = %path.display(),
        bytes = result.bytes_written,
        "patch applied"
    );
    Ok(result)
}

/// Read the target and compute the outcome of `spec` without writing.
pub fn check(spec: &PatchSpec) -> Result<Preview, ApplyError> {
    let path = spec.target_path();
    let original = fs::read_to_string(path).map_err(|source| ApplyError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(file = %path.display(), bytes = original.len(), "read target");

    Ok(preview_text(spec, original))
}

/// Compute the outcome of `spec` against in-memory file contents.
pub fn preview_text(spec: &PatchSpec, original: String) -> Preview {
    let path = spec.target_path().display();

    let transformed = match transform(&original, spec) {
        Ok(transformed) => transformed,
        Err(err) => {
            return Preview {
                original,
                patched: None,
                result: ApplyResult::not_applied(err.to_string()),
            };
        }
    };

    let result = if !transformed.matched {
        ApplyResult::not_applied(format!("pattern not found in {path}"))
    } else if transformed.text == original {
        ApplyResult::not_applied(format!(
            "pattern not found in {path} (match produced identical text)"
        ))
    } else {
        ApplyResult::applied(transformed.text.len())
    };

    let patched = result.matched.then_some(transformed.text);
    Preview {
        original,
        patched,
        result,
    }
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full write succeeds or the target keeps its previous contents.
/// The replacement inherits the target's permissions.
fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    // Create tempfile in same directory to ensure same filesystem
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;

    if let Ok(metadata) = fs::metadata(path) {
        temp.as_file().set_permissions(metadata.permissions())?;
    }

    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    // The rename has happened; a failed directory sync does not undo it.
    if let Err(err) = sync_dir(parent) {
        warn!(dir = %parent.display(), error = %err, "failed to sync directory after rename");
    }

    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

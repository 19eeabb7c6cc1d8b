use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Boundary of the vendored source tree a patch series is allowed to touch.
///
/// Every target path is resolved against an explicit root; nothing depends on
/// the process working directory.
#[derive(Debug, Clone)]
pub struct SourceTree {
    /// Canonical path to the tree root
    root: PathBuf,
    /// Directories inside the tree that patches must never write to
    forbidden_paths: Vec<PathBuf>,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("Path is outside source tree: {path} (root: {root})")]
    OutsideTree { path: PathBuf, root: PathBuf },

    #[error("Path is in forbidden directory: {path} (forbidden: {forbidden})")]
    ForbiddenPath { path: PathBuf, forbidden: PathBuf },

    #[error("Source tree root {root} is not usable: {source}")]
    Root {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SourceTree {
    /// Open a source tree rooted at `root`.
    ///
    /// The root must exist; it is canonicalized so symlinked checkouts compare
    /// correctly against resolved targets.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, SafetyError> {
        let root = root.as_ref();
        let root = root.canonicalize().map_err(|source| SafetyError::Root {
            root: root.to_path_buf(),
            source,
        })?;

        let forbidden_paths = vec![root.join(".git")];

        Ok(Self {
            root,
            forbidden_paths,
        })
    }

    /// Resolve a patch target to an absolute path inside the tree.
    ///
    /// Relative paths are joined onto the root. The target does not need to
    /// exist yet: a missing file is reported as an I/O error when the patch
    /// reads it, not here. Existing targets are canonicalized so a symlink
    /// pointing out of the tree is rejected.
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let path = path.as_ref();
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };

        let lexical = normalize(&joined);
        let resolved = lexical.canonicalize().unwrap_or(lexical);

        self.check(&resolved)?;
        Ok(resolved)
    }

    fn check(&self, resolved: &Path) -> Result<(), SafetyError> {
        if !resolved.starts_with(&self.root) || resolved == self.root {
            return Err(SafetyError::OutsideTree {
                path: resolved.to_path_buf(),
                root: self.root.clone(),
            });
        }

        for forbidden in &self.forbidden_paths {
            if resolved.starts_with(forbidden) {
                return Err(SafetyError::ForbiddenPath {
                    path: resolved.to_path_buf(),
                    forbidden: forbidden.clone(),
                });
            }
        }

        Ok(())
    }

    /// Get the tree root.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Collapse `.` and `..` components without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

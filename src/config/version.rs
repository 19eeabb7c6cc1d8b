//! Gating a patch file on the upstream source version.
//!
//! A patch file may declare `version_range = ">=16.0.0, <17.0.0"`; the caller
//! supplies the version of the checked-out tree. Patches written against one
//! release line are skipped, not failed, on another.

use semver::{Version, VersionReq};
use std::fmt;

/// Result of comparing a source version against a patch file's range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionCheck {
    /// The patch file declares no range
    Unconstrained,
    Satisfied,
    Unsatisfied { version: String, range: String },
    /// A range is declared but the caller did not say which version is checked out
    Unknown { range: String },
}

impl VersionCheck {
    /// Whether patches gated by this check should run.
    pub fn should_apply(&self) -> bool {
        !matches!(self, VersionCheck::Unsatisfied { .. })
    }
}

impl fmt::Display for VersionCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionCheck::Unconstrained => write!(f, "no version constraint"),
            VersionCheck::Satisfied => write!(f, "source version satisfies constraint"),
            VersionCheck::Unsatisfied { version, range } => {
                write!(f, "source version {version} does not satisfy {range}")
            }
            VersionCheck::Unknown { range } => {
                write!(f, "source version unknown, constraint {range} not evaluated")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum VersionError {
    InvalidVersion { value: String, source: String },
    InvalidRange { value: String, source: String },
}

impl fmt::Display for VersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionError::InvalidVersion { value, source } => {
                write!(f, "invalid source version '{}': {}", value, source)
            }
            VersionError::InvalidRange { value, source } => {
                write!(f, "invalid version_range '{}': {}", value, source)
            }
        }
    }
}

impl std::error::Error for VersionError {}

/// Compare `version` (if known) against `range` (if declared).
///
/// ```
/// use vendor_patcher::config::version::{check_source_version, VersionCheck};
///
/// let check = check_source_version(Some("16.1.4"), Some(">=16.0.0, <17.0.0")).unwrap();
/// assert_eq!(check, VersionCheck::Satisfied);
/// assert!(!check_source_version(Some("15.2.0"), Some(">=16")).unwrap().should_apply());
/// assert_eq!(check_source_version(None, None).unwrap(), VersionCheck::Unconstrained);
/// ```
pub fn check_source_version(
    version: Option<&str>,
    range: Option<&str>,
) -> Result<VersionCheck, VersionError> {
    let range = match range.map(str::trim) {
        None | Some("") => return Ok(VersionCheck::Unconstrained),
        Some(range) => range,
    };

    let req = VersionReq::parse(range).map_err(|e| VersionError::InvalidRange {
        value: range.to_string(),
        source: e.to_string(),
    })?;

    let Some(version) = version.map(str::trim) else {
        return Ok(VersionCheck::Unknown {
            range: range.to_string(),
        });
    };

    // Tags are often written "v16.1.4"
    let parsed = Version::parse(version.strip_prefix('v').unwrap_or(version)).map_err(|e| {
        VersionError::InvalidVersion {
            value: version.to_string(),
            source: e.to_string(),
        }
    })?;

    if req.matches(&parsed) {
        Ok(VersionCheck::Satisfied)
    } else {
        Ok(VersionCheck::Unsatisfied {
            version: version.to_string(),
            range: range.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_range_is_unconstrained() {
        assert_eq!(
            check_source_version(Some("16.0.0"), Some("  ")).unwrap(),
            VersionCheck::Unconstrained
        );
        assert_eq!(
            check_source_version(None, None).unwrap(),
            VersionCheck::Unconstrained
        );
    }

    #[test]
    fn test_release_line_range() {
        let range = Some(">=16.0.0, <17.0.0");
        assert_eq!(
            check_source_version(Some("16.5.2"), range).unwrap(),
            VersionCheck::Satisfied
        );
        assert_eq!(
            check_source_version(Some("v16.0.0"), range).unwrap(),
            VersionCheck::Satisfied
        );

        let check = check_source_version(Some("17.0.0"), range).unwrap();
        assert!(!check.should_apply());
        assert!(check.to_string().contains("17.0.0 does not satisfy"));
    }

    #[test]
    fn test_unknown_version_still_applies() {
        let check = check_source_version(None, Some("^16")).unwrap();
        assert!(matches!(check, VersionCheck::Unknown { .. }));
        assert!(check.should_apply());
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            check_source_version(Some("16.0.0"), Some(">=bad")),
            Err(VersionError::InvalidRange { .. })
        ));
        assert!(matches!(
            check_source_version(Some("sixteen"), Some(">=16.0.0")),
            Err(VersionError::InvalidVersion { .. })
        ));
        // A bad range is reported even when no version is supplied
        assert!(check_source_version(None, Some("~~")).is_err());
    }
}

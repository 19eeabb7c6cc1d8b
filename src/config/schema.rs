use crate::patch::{PatchError, PatchSpec};
use crate::safety::SourceTree;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PatchConfig {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub patches: Vec<PatchDefinition>,
}

impl PatchConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();
        let mut seen_ids = HashSet::new();

        if self.patches.is_empty() {
            issues.push(ValidationIssue::EmptyPatchList);
        }

        for patch in &self.patches {
            let id = patch.id.trim();
            if id.is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: None,
                    field: "id",
                });
            } else if !seen_ids.insert(id) {
                issues.push(ValidationIssue::DuplicateId {
                    patch_id: patch.id.clone(),
                });
            }

            let patch_id = (!id.is_empty()).then(|| patch.id.clone());

            if patch.file.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: patch_id.clone(),
                    field: "file",
                });
            }
            if patch.pattern.is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: patch_id.clone(),
                    field: "pattern",
                });
            }

            match &patch.verify {
                Some(Verify::ExactMatch { expected_text }) if expected_text.is_empty() => {
                    issues.push(ValidationIssue::InvalidCombo {
                        patch_id: patch_id.clone(),
                        message: "verify.expected_text must not be empty".to_string(),
                    });
                }
                Some(Verify::Hash { expected, .. }) if expected.trim().is_empty() => {
                    issues.push(ValidationIssue::MissingField {
                        patch_id: patch_id.clone(),
                        field: "verify.expected",
                    });
                }
                _ => {}
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    /// Compile every definition into a [`PatchSpec`] rooted in `tree`.
    ///
    /// Fails on the first definition with a bad pattern, template or target
    /// path, so no patch from a broken file ever reaches the apply step.
    pub fn specs(&self, tree: &SourceTree) -> Result<Vec<PatchSpec>, PatchError> {
        self.patches
            .iter()
            .map(|patch| PatchSpec::from_definition(patch, tree))
            .collect()
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Semver requirement on the upstream source version, e.g. ">=16.0.0, <17.0.0"
    #[serde(default)]
    pub version_range: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PatchDefinition {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Target file, relative to the source tree root
    pub file: String,
    /// Regular expression with at least one capture group
    pub pattern: String,
    /// Expansion template (`$1`, `${name}`, `$$`)
    #[serde(default)]
    pub replacement: String,
    #[serde(default)]
    pub on_multiple: OnMultiple,
    #[serde(default)]
    pub verify: Option<Verify>,
}

/// What to do when the pattern occurs more than once in the target.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OnMultiple {
    /// Rewrite the first occurrence only
    #[default]
    First,
    /// Refuse to patch an ambiguous target
    Error,
}

/// Pre-image check of the matched region, evaluated before rewriting.
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Verify {
    ExactMatch {
        expected_text: String,
    },
    Hash {
        #[serde(default)]
        algorithm: Option<HashAlgorithm>,
        expected: String,
    },
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum HashAlgorithm {
    Xxh3,
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyPatchList,
    MissingField {
        patch_id: Option<String>,
        field: &'static str,
    },
    DuplicateId {
        patch_id: String,
    },
    InvalidCombo {
        patch_id: Option<String>,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyPatchList => write!(f, "patch file contains no patches"),
            ValidationIssue::MissingField { patch_id, field } => match patch_id {
                Some(id) => write!(f, "patch '{id}' missing required field '{field}'"),
                None => write!(f, "patch missing required field '{field}'"),
            },
            ValidationIssue::DuplicateId { patch_id } => {
                write!(f, "patch id '{patch_id}' is declared more than once")
            }
            ValidationIssue::InvalidCombo { patch_id, message } => match patch_id {
                Some(id) => write!(f, "patch '{id}' has invalid configuration: {message}"),
                None => write!(f, "invalid patch configuration: {message}"),
            },
        }
    }
}

use crate::config::schema::{OnMultiple, PatchDefinition, Verify};
use crate::safety::{SafetyError, SourceTree};
use crate::template;
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// One named, validated textual transformation of a single file.
///
/// A `PatchSpec` can only be obtained through a constructor that compiles the
/// matcher and checks the replacement template, so a malformed pattern is a
/// construction error and never shows up later as "no match".
#[derive(Debug, Clone)]
#[must_use = "PatchSpec does nothing until it is applied"]
pub struct PatchSpec {
    id: String,
    description: Option<String>,
    target_path: PathBuf,
    matcher: Regex,
    replacement: String,
    on_multiple: OnMultiple,
    verification: Option<Verification>,
}

/// Expected pre-image of the matched region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Exact text match required
    ExactMatch(String),
    /// xxh3 hash of expected text
    Hash(u64),
}

impl Verification {
    /// Check if the matched text satisfies the verification.
    pub fn matches(&self, text: &str) -> bool {
        match self {
            Verification::ExactMatch(expected) => text == expected,
            Verification::Hash(expected) => xxh3_64(text.as_bytes()) == *expected,
        }
    }

    /// Build a hash verification from a hex string such as `0x1f2e...`.
    pub fn from_hex(value: &str) -> Option<Self> {
        let digits = value.trim();
        let digits = digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
            .unwrap_or(digits);
        u64::from_str_radix(digits, 16).ok().map(Verification::Hash)
    }
}

impl fmt::Display for Verification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verification::ExactMatch(text) => write!(f, "{text:?}"),
            Verification::Hash(hash) => write!(f, "xxh3 {hash:#018x}"),
        }
    }
}

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("patch '{id}': invalid pattern: {source}")]
    InvalidPattern {
        id: String,
        #[source]
        source: regex::Error,
    },

    #[error("patch '{id}': pattern declares no capture groups")]
    NoCaptureGroups { id: String },

    #[error("patch '{id}': replacement references undeclared group {group}")]
    UndeclaredGroup { id: String, group: String },

    #[error("patch '{id}': invalid verify hash '{value}' (expected hex xxh3)")]
    InvalidHash { id: String, value: String },

    #[error("patch '{id}': {source}")]
    Target {
        id: String,
        #[source]
        source: SafetyError,
    },
}

impl PatchSpec {
    /// Create a patch with the default first-match policy and no pre-image check.
    pub fn new(
        id: impl Into<String>,
        target_path: impl Into<PathBuf>,
        pattern: &str,
        replacement: impl Into<String>,
    ) -> Result<Self, PatchError> {
        let id = id.into();
        let replacement = replacement.into();

        let matcher = Regex::new(pattern).map_err(|source| PatchError::InvalidPattern {
            id: id.clone(),
            source,
        })?;

        // captures_len counts the implicit whole-match group
        if matcher.captures_len() < 2 {
            return Err(PatchError::NoCaptureGroups { id });
        }

        if let Some(group) = template::first_undeclared(&replacement, &matcher) {
            return Err(PatchError::UndeclaredGroup {
                id,
                group: group.to_string(),
            });
        }

        Ok(Self {
            id,
            description: None,
            target_path: target_path.into(),
            matcher,
            replacement,
            on_multiple: OnMultiple::default(),
            verification: None,
        })
    }

    /// Compile a patch file definition, resolving its target inside `tree`.
    pub fn from_definition(
        definition: &PatchDefinition,
        tree: &SourceTree,
    ) -> Result<Self, PatchError> {
        let target = tree
            .resolve(&definition.file)
            .map_err(|source| PatchError::Target {
                id: definition.id.clone(),
                source,
            })?;

        let verification = match &definition.verify {
            None => None,
            Some(Verify::ExactMatch { expected_text }) => {
                Some(Verification::ExactMatch(expected_text.clone()))
            }
            Some(Verify::Hash { expected, .. }) => {
                let verification =
                    Verification::from_hex(expected).ok_or_else(|| PatchError::InvalidHash {
                        id: definition.id.clone(),
                        value: expected.clone(),
                    })?;
                Some(verification)
            }
        };

        let mut spec = Self::new(
            definition.id.clone(),
            target,
            &definition.pattern,
            definition.replacement.clone(),
        )?
        .with_on_multiple(definition.on_multiple);
        spec.description = definition.description.clone();
        spec.verification = verification;
        Ok(spec)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_on_multiple(mut self, on_multiple: OnMultiple) -> Self {
        self.on_multiple = on_multiple;
        self
    }

    pub fn with_verification(mut self, verification: Verification) -> Self {
        self.verification = Some(verification);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn target_path(&self) -> &Path {
        &self.target_path
    }

    pub fn matcher(&self) -> &Regex {
        &self.matcher
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    pub fn on_multiple(&self) -> OnMultiple {
        self.on_multiple
    }

    pub fn verification(&self) -> Option<&Verification> {
        self.verification.as_ref()
    }
}

impl fmt::Display for PatchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(description) => write!(f, "{} ({})", self.id, description),
            None => write!(f, "{}", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const MEMFD_PATTERN: &str =
        r"(Linux\.syscall\s*\(\s*LinuxSyscall\.MEMFD_CREATE\s*,\s*)(\w+)(\s*,\s*flags\s*\))";

    #[test]
    fn test_new_accepts_memfd_patch() {
        let spec = PatchSpec::new("0009", "linux.vala", MEMFD_PATTERN, r#"$1"jit-cache"$3"#)
            .unwrap()
            .with_description("memfd name");
        assert_eq!(spec.id(), "0009");
        assert_eq!(spec.on_multiple(), OnMultiple::First);
        assert_eq!(spec.to_string(), "0009 (memfd name)");
    }

    #[test]
    fn test_malformed_pattern_rejected() {
        let err = PatchSpec::new("bad", "a.c", r"(unclosed", "$1").unwrap_err();
        assert!(matches!(err, PatchError::InvalidPattern { .. }));
        assert!(err.to_string().contains("patch 'bad'"));
    }

    #[test]
    fn test_pattern_without_groups_rejected() {
        let err = PatchSpec::new("flat", "a.c", r"foo", "bar").unwrap_err();
        assert!(matches!(err, PatchError::NoCaptureGroups { .. }));
    }

    #[test]
    fn test_undeclared_group_rejected() {
        let err = PatchSpec::new("p", "a.c", r"(a)(b)", "$1$3").unwrap_err();
        match err {
            PatchError::UndeclaredGroup { group, .. } => assert_eq!(group, "$3"),
            other => panic!("unexpected error: {other}"),
        }

        let err = PatchSpec::new("p", "a.c", r"(?P<head>a)", "${tail}").unwrap_err();
        assert!(matches!(err, PatchError::UndeclaredGroup { .. }));
    }

    #[test]
    fn test_empty_replacement_allowed() {
        assert!(PatchSpec::new("delete", "a.c", r"(debug_hook\(\);)", "").is_ok());
    }

    #[test]
    fn test_verification_hash() {
        let text = "Linux.syscall(LinuxSyscall.MEMFD_CREATE, name, flags)";
        let hex = format!("{:#x}", xxh3_64(text.as_bytes()));
        let verify = Verification::from_hex(&hex).unwrap();
        assert!(verify.matches(text));
        assert!(!verify.matches("something else"));
        assert!(Verification::from_hex("not-hex").is_none());
    }

    #[test]
    fn test_from_definition_resolves_and_verifies() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(temp_dir.path().join("lib/base")).unwrap();
        let tree = SourceTree::new(temp_dir.path()).unwrap();

        let definition = PatchDefinition {
            id: "0009".to_string(),
            description: Some("memfd name".to_string()),
            file: "lib/base/linux.vala".to_string(),
            pattern: MEMFD_PATTERN.to_string(),
            replacement: r#"$1"jit-cache"$3"#.to_string(),
            on_multiple: OnMultiple::Error,
            verify: Some(Verify::ExactMatch {
                expected_text: "x".to_string(),
            }),
        };

        let spec = PatchSpec::from_definition(&definition, &tree).unwrap();
        assert!(spec.target_path().starts_with(tree.root()));
        assert_eq!(spec.on_multiple(), OnMultiple::Error);
        assert_eq!(spec.description(), Some("memfd name"));
        assert_eq!(
            spec.verification(),
            Some(&Verification::ExactMatch("x".to_string()))
        );
    }

    #[test]
    fn test_from_definition_rejects_bad_hash_and_escape() {
        let temp_dir = tempfile::tempdir().unwrap();
        let tree = SourceTree::new(temp_dir.path()).unwrap();

        let mut definition = PatchDefinition {
            id: "p".to_string(),
            description: None,
            file: "a.c".to_string(),
            pattern: "(a)".to_string(),
            replacement: "b".to_string(),
            on_multiple: OnMultiple::First,
            verify: Some(Verify::Hash {
                algorithm: None,
                expected: "zzz".to_string(),
            }),
        };
        let err = PatchSpec::from_definition(&definition, &tree).unwrap_err();
        assert!(matches!(err, PatchError::InvalidHash { .. }));

        definition.verify = None;
        definition.file = "../escape.c".to_string();
        let err = PatchSpec::from_definition(&definition, &tree).unwrap_err();
        assert!(matches!(err, PatchError::Target { .. }));
    }
}

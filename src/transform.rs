//! Locate the patch target in a file's text and rewrite it.
//!
//! This layer is pure: it never touches the filesystem. A missing target is
//! reported as `matched == false`, leaving the decision to the writer.

use crate::config::schema::OnMultiple;
use crate::patch::PatchSpec;
use std::ops::Range;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

/// Output of [`transform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transformed {
    /// Rewritten text, or the original text when nothing matched
    pub text: String,
    pub matched: bool,
    /// Byte range of the matched region in the original text
    pub span: Option<Range<usize>>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("pattern matched {count} locations in {} (expected 1)", file.display())]
    AmbiguousMatch { file: PathBuf, count: usize },

    #[error(
        "matched text at {}:{byte_start} failed verification (expected {expected}, found {found:?})",
        file.display()
    )]
    PreimageMismatch {
        file: PathBuf,
        byte_start: usize,
        expected: String,
        found: String,
    },
}

/// Rewrite the first occurrence of the spec's matcher in `original`.
///
/// Everything outside the matched region is returned byte-identical.
pub fn transform(original: &str, spec: &PatchSpec) -> Result<Transformed, TransformError> {
    let matcher = spec.matcher();

    let Some(captures) = matcher.captures(original) else {
        debug!(patch = %spec.id(), "pattern matched no locations");
        return Ok(Transformed {
            text: original.to_string(),
            matched: false,
            span: None,
        });
    };
    let Some(whole) = captures.get(0) else {
        return Ok(Transformed {
            text: original.to_string(),
            matched: false,
            span: None,
        });
    };

    if spec.on_multiple() == OnMultiple::Error {
        let count = matcher.find_iter(original).take(2).count();
        if count > 1 {
            return Err(TransformError::AmbiguousMatch {
                file: spec.target_path().to_path_buf(),
                count: matcher.find_iter(original).count(),
            });
        }
    }

    if let Some(verification) = spec.verification() {
        if !verification.matches(whole.as_str()) {
            return Err(TransformError::PreimageMismatch {
                file: spec.target_path().to_path_buf(),
                byte_start: whole.start(),
                expected: verification.to_string(),
                found: whole.as_str().to_string(),
            });
        }
    }

    let mut replacement = String::new();
    captures.expand(spec.replacement(), &mut replacement);

    debug!(
        patch = %spec.id(),
        byte_start = whole.start(),
        byte_end = whole.end(),
        "pattern matched"
    );

    let mut text = String::with_capacity(original.len() - whole.len() + replacement.len());
    text.push_str(&original[..whole.start()]);
    text.push_str(&replacement);
    text.push_str(&original[whole.end()..]);

    Ok(Transformed {
        text,
        matched: true,
        span: Some(whole.range()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::Verification;

    const MEMFD_PATTERN: &str =
        r"(Linux\.syscall\s*\(\s*LinuxSyscall\.MEMFD_CREATE\s*,\s*)(\w+)(\s*,\s*flags\s*\))";
    const MEMFD_REPLACEMENT: &str = r#"$1"jit-cache"$3"#;

    fn memfd_spec() -> PatchSpec {
        PatchSpec::new("0009", "lib/base/linux.vala", MEMFD_PATTERN, MEMFD_REPLACEMENT).unwrap()
    }

    #[test]
    fn test_memfd_identifier_wrapped_in_literal() {
        let original = "\tint fd = Linux.syscall(LinuxSyscall.MEMFD_CREATE, name, flags);\n";
        let result = transform(original, &memfd_spec()).unwrap();

        assert!(result.matched);
        assert_eq!(
            result.text,
            "\tint fd = Linux.syscall(LinuxSyscall.MEMFD_CREATE, \"jit-cache\", flags);\n"
        );
        assert_eq!(result.span, Some(10..63));
    }

    #[test]
    fn test_already_literal_does_not_match() {
        let original = "Linux.syscall(LinuxSyscall.MEMFD_CREATE, \"jit-cache\", flags);";
        let result = transform(original, &memfd_spec()).unwrap();

        assert!(!result.matched);
        assert_eq!(result.text, original);
        assert_eq!(result.span, None);
    }

    #[test]
    fn test_whitespace_variants_preserved() {
        let original = "Linux.syscall (\n\tLinuxSyscall.MEMFD_CREATE ,  name ,flags )";
        let result = transform(original, &memfd_spec()).unwrap();

        assert!(result.matched);
        assert_eq!(
            result.text,
            "Linux.syscall (\n\tLinuxSyscall.MEMFD_CREATE ,  \"jit-cache\" ,flags )"
        );
    }

    #[test]
    fn test_first_match_only() {
        let spec = PatchSpec::new("p", "a.c", r"(foo)\((\w+)\)", "$1(0)").unwrap();
        let result = transform("foo(a); foo(b);", &spec).unwrap();

        assert!(result.matched);
        assert_eq!(result.text, "foo(0); foo(b);");
    }

    #[test]
    fn test_multiple_matches_rejected_on_request() {
        let spec = PatchSpec::new("p", "a.c", r"(foo)\((\w+)\)", "$1(0)")
            .unwrap()
            .with_on_multiple(OnMultiple::Error);

        let err = transform("foo(a); foo(b); foo(c);", &spec).unwrap_err();
        assert!(matches!(err, TransformError::AmbiguousMatch { count: 3, .. }));

        let single = transform("foo(a);", &spec).unwrap();
        assert_eq!(single.text, "foo(0);");
    }

    #[test]
    fn test_named_groups_and_escaped_dollar() {
        let spec = PatchSpec::new(
            "p",
            "a.c",
            r"(?P<key>price)\s*=\s*(?P<value>\d+)",
            "${key} = $$${value}",
        )
        .unwrap();
        let result = transform("let price = 42;", &spec).unwrap();

        assert_eq!(result.text, "let price = $42;");
    }

    #[test]
    fn test_identity_replacement_reports_match_with_same_text() {
        let spec = PatchSpec::new("p", "a.c", r"(abc)", "$1").unwrap();
        let result = transform("xabcx", &spec).unwrap();

        assert!(result.matched);
        assert_eq!(result.text, "xabcx");
    }

    #[test]
    fn test_preimage_verification() {
        let original = "Linux.syscall(LinuxSyscall.MEMFD_CREATE, name, flags)";

        let passing = memfd_spec().with_verification(Verification::ExactMatch(original.into()));
        assert!(transform(original, &passing).unwrap().matched);

        let failing =
            memfd_spec().with_verification(Verification::ExactMatch("something else".into()));
        let err = transform(original, &failing).unwrap_err();
        assert!(matches!(
            err,
            TransformError::PreimageMismatch { byte_start: 0, .. }
        ));
    }
}

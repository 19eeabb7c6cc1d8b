//! Replacement template references.
//!
//! Templates use the `regex` crate's expansion syntax: `$N` / `$name` take the
//! longest run of `[_0-9A-Za-z]`, `${N}` / `${name}` are braced, and `$$` is a
//! literal dollar. `Captures::expand` substitutes an empty string for a group
//! that does not exist, so every reference is checked against the compiled
//! matcher before a patch is accepted.

use regex::Regex;

/// A capture group named by a replacement template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupRef<'t> {
    Index(usize),
    Name(&'t str),
}

impl<'t> GroupRef<'t> {
    fn parse(name: &'t str) -> Self {
        match name.parse::<usize>() {
            Ok(index) => GroupRef::Index(index),
            Err(_) => GroupRef::Name(name),
        }
    }

    /// Whether `matcher` declares this group.
    pub fn is_declared_in(&self, matcher: &Regex) -> bool {
        match self {
            GroupRef::Index(index) => *index < matcher.captures_len(),
            GroupRef::Name(name) => matcher.capture_names().flatten().any(|n| n == *name),
        }
    }
}

impl std::fmt::Display for GroupRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupRef::Index(index) => write!(f, "${index}"),
            GroupRef::Name(name) => write!(f, "${{{name}}}"),
        }
    }
}

/// Collect every group reference in `template`, in order of appearance.
pub fn references(template: &str) -> Vec<GroupRef<'_>> {
    let bytes = template.as_bytes();
    let mut refs = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        if bytes.get(i + 1) == Some(&b'$') {
            i += 2;
            continue;
        }
        match parse_reference(&template[i + 1..]) {
            Some((name, consumed)) => {
                refs.push(GroupRef::parse(name));
                i += 1 + consumed;
            }
            // A lone `$` expands to itself.
            None => i += 1,
        }
    }

    refs
}

/// Return the first reference in `template` that `matcher` does not declare.
pub fn first_undeclared<'t>(template: &'t str, matcher: &Regex) -> Option<GroupRef<'t>> {
    references(template)
        .into_iter()
        .find(|group| !group.is_declared_in(matcher))
}

fn parse_reference(rest: &str) -> Option<(&str, usize)> {
    if let Some(braced) = rest.strip_prefix('{') {
        let end = braced.find('}')?;
        return Some((&braced[..end], end + 2));
    }

    let len = rest
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
        .count();
    if len == 0 {
        None
    } else {
        Some((&rest[..len], len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbered_references() {
        let refs = references(r#"$1"jit-cache"$3"#);
        assert_eq!(refs, vec![GroupRef::Index(1), GroupRef::Index(3)]);
    }

    #[test]
    fn test_braced_and_named_references() {
        let refs = references("${prefix}x${2}y$name");
        assert_eq!(
            refs,
            vec![
                GroupRef::Name("prefix"),
                GroupRef::Index(2),
                GroupRef::Name("name")
            ]
        );
    }

    #[test]
    fn test_escaped_and_lone_dollars() {
        assert!(references("cost: $$5").is_empty());
        assert!(references("trailing $").is_empty());
        assert!(references("$-").is_empty());
        assert!(references("${unterminated").is_empty());
    }

    #[test]
    fn test_greedy_name_swallows_suffix() {
        // `$1a` names a group called "1a", not group 1 followed by 'a'.
        assert_eq!(references("$1a"), vec![GroupRef::Name("1a")]);
        assert_eq!(references("${1}a"), vec![GroupRef::Index(1)]);
    }

    #[test]
    fn test_first_undeclared() {
        let matcher = Regex::new(r"(?P<head>a)(b)").unwrap();
        assert_eq!(first_undeclared("$0$1$2${head}", &matcher), None);
        assert_eq!(first_undeclared("$1$3", &matcher), Some(GroupRef::Index(3)));
        assert_eq!(
            first_undeclared("$1a", &matcher),
            Some(GroupRef::Name("1a"))
        );
        assert_eq!(first_undeclared("${}", &matcher), Some(GroupRef::Name("")));
    }

    #[test]
    fn test_display() {
        assert_eq!(GroupRef::Index(4).to_string(), "$4");
        assert_eq!(GroupRef::Name("tail").to_string(), "${tail}");
    }
}

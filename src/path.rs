//! Path manipulation utilities for kit-merge

use std::path::Path;

use crate::error::Result;
use glob::Pattern;
use regex::Regex;

/// Decide whether `rel` (relative to the sync root) is excluded.
///
/// Patterns follow rsync conventions: a leading `/` anchors the pattern at
/// the sync root, anything else matches the file name or any trailing run
/// of path components.
pub fn is_excluded(patterns: &[Pattern], anchored: &[bool], rel: &Path) -> bool {
    let rel_str = rel.to_string_lossy();
    let components: Vec<&str> = rel_str.split('/').collect();
    patterns.iter().zip(anchored).any(|(pattern, &anchored)| {
        if anchored {
            return pattern.matches(&rel_str);
        }
        (0..components.len()).any(|start| pattern.matches(&components[start..].join("/")))
    })
}

/// Compile rsync-style exclude patterns into glob patterns plus an
/// "anchored" flag per pattern.
pub fn compile_excludes(excludes: &[String]) -> Result<(Vec<Pattern>, Vec<bool>)> {
    let mut patterns = Vec::with_capacity(excludes.len());
    let mut anchored = Vec::with_capacity(excludes.len());
    for raw in excludes {
        let (body, is_anchored) = match raw.strip_prefix('/') {
            Some(rest) => (rest, true),
            None => (raw.as_str(), false),
        };
        patterns.push(Pattern::new(body.trim_end_matches('/'))?);
        anchored.push(is_anchored);
    }
    Ok((patterns, anchored))
}

/// Rename `path` with a regex that may contain capture groups.
///
/// `replacement` references capture groups as `$1`, `$2`, etc. Returns
/// `None` when the regex does not match.
pub fn rename_with(regex: &Regex, replacement: &str, path: &str) -> Option<String> {
    let captures = regex.captures(path)?;
    let mut result = String::new();
    let mut chars = replacement.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' {
            if let Some(digit) = chars.peek().and_then(|c| c.to_digit(10)) {
                chars.next();
                if let Some(capture) = captures.get(digit as usize) {
                    result.push_str(capture.as_str());
                }
                continue;
            }
        }
        result.push(ch);
    }

    Some(result)
}

/// Encode a repository pin (branch name or commit id) to be filesystem-safe
pub fn encode_pin(pin: &str) -> String {
    pin.chars()
        .map(|c| match c {
            c if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' => c,
            _ => '-',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rename(pattern: &str, replacement: &str, path: &str) -> Option<String> {
        rename_with(&Regex::new(pattern).unwrap(), replacement, path)
    }

    #[test]
    fn test_rename_with_captures() {
        assert_eq!(rename(r"^(.*)$", "$1-pure64", "amd64").as_deref(), Some("amd64-pure64"));
    }

    #[test]
    fn test_rename_no_match() {
        assert_eq!(rename(r"^core2$", "x", "amd64"), None);
    }

    #[test]
    fn test_rename_keeps_literal_dollar() {
        assert_eq!(rename(r"^(a)$", "$x$1", "a").as_deref(), Some("$xa"));
    }

    #[test]
    fn test_excludes_anchored_and_floating() {
        let (patterns, anchored) = compile_excludes(&[
            "/metadata/cache/**".to_string(),
            "ChangeLog".to_string(),
            "/.git".to_string(),
        ])
        .unwrap();
        assert!(is_excluded(&patterns, &anchored, Path::new("metadata/cache/sys-apps/foo")));
        assert!(!is_excluded(&patterns, &anchored, Path::new("x/metadata/cache/foo")));
        assert!(is_excluded(&patterns, &anchored, Path::new("sys-apps/portage/ChangeLog")));
        assert!(is_excluded(&patterns, &anchored, Path::new(".git")));
        assert!(!is_excluded(&patterns, &anchored, Path::new("sys-apps/portage/Manifest")));
    }

    #[test]
    fn test_floating_exclude_matches_directory_suffix() {
        let (patterns, anchored) = compile_excludes(&["dev-util/metro".to_string()]).unwrap();
        assert!(is_excluded(&patterns, &anchored, Path::new("dev-util/metro")));
        assert!(!is_excluded(&patterns, &anchored, Path::new("dev-util/metro2")));
    }

    #[test]
    fn test_encode_pin() {
        assert_eq!(encode_pin("1.0-prime"), "1.0-prime");
        assert_eq!(encode_pin("feature/x"), "feature-x");
    }
}

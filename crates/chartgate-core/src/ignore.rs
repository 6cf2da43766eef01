//! `.helmignore` support
//!
//! Rules are evaluated in order and the last matching rule wins, so a later
//! `!pattern` can re-include something an earlier rule excluded.

use glob::{MatchOptions, Pattern};
use std::path::Path;

use crate::error::{CoreError, Result};

/// Ignore file name inside a chart directory
pub const HELMIGNORE_FILE: &str = ".helmignore";

/// Hidden files directly under `templates/` never make it into a package
const DEFAULT_RULES: &[&str] = &["templates/.?*"];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
struct Rule {
    pattern: Pattern,
    negate: bool,
    dir_only: bool,
    /// Patterns with a `/` are matched against the full relative path,
    /// the others against the last path component only.
    anchored: bool,
}

/// Parsed `.helmignore` rules
#[derive(Debug, Clone, Default)]
pub struct HelmIgnore {
    rules: Vec<Rule>,
}

impl HelmIgnore {
    /// Rules for a chart directory: defaults plus its `.helmignore`, if any
    pub fn for_chart_dir(dir: &Path) -> Result<Self> {
        let mut ignore = Self::parse(&DEFAULT_RULES.join("\n"))?;
        let path = dir.join(HELMIGNORE_FILE);
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            ignore.rules.extend(Self::parse(&content)?.rules);
        }
        Ok(ignore)
    }

    /// Parse ignore rules from file content
    pub fn parse(content: &str) -> Result<Self> {
        let mut rules = Vec::new();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (negate, rest) = match line.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, line),
            };
            let (dir_only, rest) = match rest.strip_suffix('/') {
                Some(rest) => (true, rest),
                None => (false, rest),
            };
            let rest = rest.trim_start_matches("./").trim_start_matches('/');
            if rest.is_empty() {
                continue;
            }

            let pattern = Pattern::new(rest).map_err(|e| CoreError::IgnorePattern {
                pattern: line.to_string(),
                message: e.to_string(),
            })?;

            rules.push(Rule {
                pattern,
                negate,
                dir_only,
                anchored: rest.contains('/'),
            });
        }

        Ok(Self { rules })
    }

    /// Whether a chart-relative path (using `/` separators) is ignored
    pub fn is_ignored(&self, rel_path: &str, is_dir: bool) -> bool {
        let name = rel_path.rsplit('/').next().unwrap_or(rel_path);
        let mut ignored = false;

        for rule in &self.rules {
            if rule.dir_only && !is_dir {
                continue;
            }
            let candidate = if rule.anchored { rel_path } else { name };
            if rule.pattern.matches_with(candidate, MATCH_OPTIONS) {
                ignored = !rule.negate;
            }
        }

        ignored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basename_patterns() {
        let ignore = HelmIgnore::parse("# comment\n*.tgz\n.git/\n").unwrap();
        assert!(ignore.is_ignored("old-1.0.0.tgz", false));
        assert!(ignore.is_ignored("charts/sub-1.0.0.tgz", false));
        assert!(ignore.is_ignored(".git", true));
        assert!(!ignore.is_ignored(".git", false));
        assert!(!ignore.is_ignored("values.yaml", false));
    }

    #[test]
    fn test_anchored_patterns() {
        let ignore = HelmIgnore::parse("ci/*.yaml\n").unwrap();
        assert!(ignore.is_ignored("ci/values-test.yaml", false));
        assert!(!ignore.is_ignored("values.yaml", false));
        assert!(!ignore.is_ignored("ci/nested/x.yaml", false));
    }

    #[test]
    fn test_negation_last_match_wins() {
        let ignore = HelmIgnore::parse("*.md\n!README.md\n").unwrap();
        assert!(ignore.is_ignored("NOTES.md", false));
        assert!(!ignore.is_ignored("README.md", false));
    }

    #[test]
    fn test_default_rules() {
        let temp = tempfile::TempDir::new().unwrap();
        let ignore = HelmIgnore::for_chart_dir(temp.path()).unwrap();
        assert!(ignore.is_ignored("templates/.swp", false));
        assert!(!ignore.is_ignored("templates/deployment.yaml", false));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(HelmIgnore::parse("[abc\n").is_err());
    }
}

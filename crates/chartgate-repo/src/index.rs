//! Repository index types
//!
//! Helm-compatible `index.yaml`, including the `serverInfo` block ChartMuseum
//! uses to advertise its context path.

use chrono::{DateTime, Utc};
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{RepoError, Result};

/// Repository index (Helm-compatible)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryIndex {
    #[serde(default)]
    pub api_version: String,

    #[serde(default)]
    pub generated: Option<DateTime<Utc>>,

    /// Chart versions indexed by chart name
    #[serde(default)]
    pub entries: HashMap<String, Vec<ChartVersion>>,

    /// Server-reported settings (ChartMuseum)
    #[serde(default)]
    pub server_info: Option<ServerInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    #[serde(default)]
    pub context_path: Option<String>,
}

/// Chart version entry in the index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartVersion {
    pub name: String,

    pub version: String,

    #[serde(default)]
    pub app_version: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// URLs to download the chart archive, absolute or relative to the repository
    #[serde(default)]
    pub urls: Vec<String>,

    /// SHA256 digest of the archive
    #[serde(default)]
    pub digest: Option<String>,

    #[serde(default)]
    pub deprecated: bool,
}

impl ChartVersion {
    /// Get the primary download URL
    pub fn download_url(&self) -> Option<&str> {
        self.urls.first().map(|s| s.as_str())
    }

    /// Parse version as semver, tolerating a leading `v`
    pub fn parsed_version(&self) -> Option<Version> {
        Version::parse(self.version.trim_start_matches('v')).ok()
    }
}

impl RepositoryIndex {
    /// Parse index from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| RepoError::IndexParse {
            message: e.to_string(),
        })
    }

    /// Parse index from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let yaml = std::str::from_utf8(bytes).map_err(|e| RepoError::IndexParse {
            message: format!("Invalid UTF-8: {}", e),
        })?;
        Self::from_yaml(yaml)
    }

    /// Context path reported by the server, empty when absent
    pub fn context_path(&self) -> &str {
        self.server_info
            .as_ref()
            .and_then(|info| info.context_path.as_deref())
            .unwrap_or("")
    }

    /// Find the highest version matching a Helm-style constraint
    pub fn find_best_match(&self, name: &str, constraint: &str) -> Result<&ChartVersion> {
        let entries = self
            .entries
            .get(name)
            .ok_or_else(|| RepoError::dependency(format!("chart {} not found in repository index", name)))?;

        let reqs = parse_constraint(constraint)?;

        entries
            .iter()
            .filter_map(|e| e.parsed_version().map(|v| (v, e)))
            .filter(|(v, _)| reqs.iter().any(|req| req.matches(v)))
            .max_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, e)| e)
            .ok_or_else(|| RepoError::UnsatisfiableConstraint {
                name: name.to_string(),
                constraint: constraint.to_string(),
                available: entries
                    .iter()
                    .map(|e| e.version.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

const OPERATORS: &[&str] = &["=", ">", ">=", "<", "<=", "~", "^", "~>"];

/// Translate a Helm (Masterminds) version constraint into semver requirements
///
/// Alternatives are separated by `||` and any one of them may match.
/// Within an alternative, comparators are separated by commas or spaces.
/// A bare version is an exact match, unlike Cargo's default caret.
pub fn parse_constraint(constraint: &str) -> Result<Vec<VersionReq>> {
    let constraint = constraint.trim();
    if constraint.is_empty() {
        return Ok(vec![VersionReq::STAR]);
    }

    constraint
        .split("||")
        .map(|alternative| {
            let mut comparators: Vec<String> = Vec::new();
            let mut pending_op: Option<&str> = None;

            for token in alternative
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|t| !t.is_empty())
            {
                if OPERATORS.contains(&token) {
                    pending_op = Some(token);
                    continue;
                }
                let token = match pending_op.take() {
                    Some(op) => format!("{}{}", op, token),
                    None => token.to_string(),
                };
                comparators.push(normalize_comparator(&token));
            }

            if comparators.is_empty() {
                return Err(invalid_constraint(constraint, "empty alternative"));
            }

            VersionReq::parse(&comparators.join(", "))
                .map_err(|e| invalid_constraint(constraint, &e.to_string()))
        })
        .collect()
}

fn normalize_comparator(token: &str) -> String {
    let split = token
        .find(|c: char| c.is_ascii_digit() || c == 'v' || c == '*' || c == 'x' || c == 'X')
        .unwrap_or(token.len());
    let (op, version) = token.split_at(split);
    let version = version.strip_prefix('v').unwrap_or(version);
    let op = match op {
        "~>" => "~",
        "" if !version.contains(['*', 'x', 'X']) => "=",
        other => other,
    };
    format!("{}{}", op, version)
}

fn invalid_constraint(constraint: &str, reason: &str) -> RepoError {
    RepoError::dependency(format!(
        "invalid version constraint '{}': {}",
        constraint, reason
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"apiVersion: v1
entries:
  redis:
  - name: redis
    version: 17.1.0
    urls:
    - charts/redis-17.1.0.tgz
    digest: abc
  - name: redis
    version: 17.0.2
    urls:
    - charts/redis-17.0.2.tgz
  - name: redis
    version: 16.9.0
    urls:
    - https://mirror.example.com/redis-16.9.0.tgz
  - name: redis
    version: 18.0.0-rc.1
    urls:
    - charts/redis-18.0.0-rc.1.tgz
generated: "2024-01-01T10:00:00Z"
serverInfo:
  contextPath: /helm/v1
"#;

    fn versions(index: &RepositoryIndex, constraint: &str) -> String {
        index.find_best_match("redis", constraint).unwrap().version.clone()
    }

    #[test]
    fn test_parse_index() {
        let index = RepositoryIndex::from_yaml(INDEX).unwrap();
        assert_eq!(index.entries["redis"].len(), 4);
        assert_eq!(index.context_path(), "/helm/v1");
        assert_eq!(
            index.find_best_match("redis", "17.0.2").unwrap().download_url(),
            Some("charts/redis-17.0.2.tgz")
        );
    }

    #[test]
    fn test_index_without_server_info() {
        let index = RepositoryIndex::from_yaml("apiVersion: v1\nentries: {}\n").unwrap();
        assert_eq!(index.context_path(), "");
    }

    #[test]
    fn test_malformed_index() {
        let err = RepositoryIndex::from_bytes(b"entries: [unterminated").unwrap_err();
        assert!(matches!(err, RepoError::IndexParse { .. }));

        let err = RepositoryIndex::from_bytes(&[0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, RepoError::IndexParse { .. }));
    }

    #[test]
    fn test_constraints() {
        let index = RepositoryIndex::from_yaml(INDEX).unwrap();
        assert_eq!(versions(&index, ""), "17.1.0");
        assert_eq!(versions(&index, "17.0.2"), "17.0.2");
        assert_eq!(versions(&index, "~17.0.0"), "17.0.2");
        assert_eq!(versions(&index, "^17.0.0"), "17.1.0");
        assert_eq!(versions(&index, ">= 16.0.0 < 17.0.0"), "16.9.0");
        assert_eq!(versions(&index, ">=16.0.0, <17.0.0"), "16.9.0");
        assert_eq!(versions(&index, "16.x"), "16.9.0");
        assert_eq!(versions(&index, "v17.0.2"), "17.0.2");
        assert_eq!(versions(&index, "16.9.0 || 17.0.2"), "17.0.2");
    }

    #[test]
    fn test_unsatisfiable_constraint() {
        let index = RepositoryIndex::from_yaml(INDEX).unwrap();
        let err = index.find_best_match("redis", "^20.0.0").unwrap_err();
        assert!(matches!(err, RepoError::UnsatisfiableConstraint { .. }));

        let err = index.find_best_match("postgres", "*").unwrap_err();
        assert!(err.to_string().contains("postgres"));
    }

    #[test]
    fn test_invalid_constraint() {
        assert!(parse_constraint("not a version").is_err());
        assert!(parse_constraint(">= 1.0 ||").is_err());
    }
}

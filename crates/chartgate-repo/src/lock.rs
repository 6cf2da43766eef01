//! Dependency lock files
//!
//! `Chart.lock` (Helm 3) and `requirements.lock` (Helm 2) share one format:
//! the resolved versions plus a digest of the declared and locked
//! dependencies.

use chartgate_core::ChartDependency;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::error::{RepoError, Result};

/// Lock file written next to `Chart.yaml` by Helm 3
pub const CHART_LOCK: &str = "Chart.lock";

/// Lock file written next to `requirements.yaml` by Helm 2
pub const REQUIREMENTS_LOCK: &str = "requirements.lock";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockFile {
    /// Locked dependencies
    #[serde(default)]
    pub dependencies: Vec<LockedDependency>,

    /// Digest over declared and locked dependencies
    pub digest: String,

    pub generated: DateTime<Utc>,
}

/// A dependency pinned to an exact version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedDependency {
    pub name: String,

    /// Exact resolved version (not a range)
    pub version: String,

    /// Repository as declared
    pub repository: String,
}

impl LockFile {
    pub fn new(declared: &[ChartDependency], dependencies: Vec<LockedDependency>) -> Result<Self> {
        let digest = lock_digest(declared, &dependencies)?;
        Ok(Self {
            dependencies,
            digest,
            generated: Utc::now(),
        })
    }

    /// Save lock file to path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

fn lock_digest(declared: &[ChartDependency], locked: &[LockedDependency]) -> Result<String> {
    let payload = serde_json::to_vec(&(declared, locked))
        .map_err(|e| RepoError::Serialization(e.to_string()))?;
    Ok(compute_sha256(&payload))
}

/// SHA256 of `data` as `sha256:<hex>`
pub fn compute_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    format!("sha256:{}", hex::encode(result))
}

/// Compare an index digest (bare hex or `sha256:`-prefixed) against `data`
pub fn digest_matches(expected: &str, data: &[u8]) -> bool {
    let expected = expected.trim();
    let expected = expected.strip_prefix("sha256:").unwrap_or(expected);
    let actual = compute_sha256(data);
    actual
        .strip_prefix("sha256:")
        .is_some_and(|hex| hex.eq_ignore_ascii_case(expected))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declared() -> Vec<ChartDependency> {
        vec![ChartDependency {
            name: "redis".to_string(),
            version: "^17.0.0".to_string(),
            repository: "https://charts.example.com".to_string(),
            ..Default::default()
        }]
    }

    fn locked() -> Vec<LockedDependency> {
        vec![LockedDependency {
            name: "redis".to_string(),
            version: "17.1.0".to_string(),
            repository: "https://charts.example.com".to_string(),
        }]
    }

    #[test]
    fn test_digest_format() {
        let digest = compute_sha256(b"test data");
        assert!(digest.starts_with("sha256:"));
        assert_eq!(digest.len(), "sha256:".len() + 64);
    }

    #[test]
    fn test_digest_matches() {
        let digest = compute_sha256(b"archive");
        assert!(digest_matches(&digest, b"archive"));
        assert!(digest_matches(digest.trim_start_matches("sha256:"), b"archive"));
        assert!(digest_matches(&digest.to_uppercase().replace("SHA256:", ""), b"archive"));
        assert!(!digest_matches(&digest, b"tampered"));
    }

    #[test]
    fn test_save_and_load() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join(CHART_LOCK);

        let lock = LockFile::new(&declared(), locked()).unwrap();
        lock.save(&path).unwrap();

        let loaded: LockFile =
            serde_yaml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.digest, lock.digest);
        assert_eq!(loaded.dependencies, locked());

        let mut changed = declared();
        changed[0].version = "^18.0.0".to_string();
        assert_ne!(LockFile::new(&changed, locked()).unwrap().digest, lock.digest);
    }
}

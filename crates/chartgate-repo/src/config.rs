//! Repository configuration
//!
//! Reads the Helm repository list (`repositories.yaml`). chartgate never
//! writes this file: repositories synthesized from a URL stay in memory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RepoError, Result};
use crate::version::HelmMajorVersion;

/// TLS material and verification settings for a registry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsOptions {
    pub ca_file: Option<PathBuf>,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub insecure_skip_verify: bool,
}

/// A registry to push to, resolved from a name or a literal URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoConfig {
    /// Name used in user-facing messages (the URL itself for literal URLs)
    pub name: String,

    /// Base URL, possibly using the `cm://` marker scheme
    pub url: String,

    pub tls: TlsOptions,
}

impl RepoConfig {
    /// Repository for a literal URL; its name is the URL
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            name: url.clone(),
            url,
            tls: TlsOptions::default(),
        }
    }
}

impl From<&RepositoryEntry> for RepoConfig {
    fn from(entry: &RepositoryEntry) -> Self {
        Self {
            name: entry.name.clone(),
            url: entry.url.clone(),
            tls: TlsOptions {
                ca_file: entry.ca_file.clone(),
                cert_file: entry.cert_file.clone(),
                key_file: entry.key_file.clone(),
                insecure_skip_verify: entry.insecure_skip_tls_verify,
            },
        }
    }
}

/// Helm repository list file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryFile {
    #[serde(default)]
    pub api_version: String,

    #[serde(default)]
    pub repositories: Vec<RepositoryEntry>,
}

/// Entry of the Helm repository list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryEntry {
    pub name: String,

    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_file: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,

    #[serde(default, rename = "insecure_skip_tls_verify")]
    pub insecure_skip_tls_verify: bool,
}

impl RepositoryFile {
    /// Load the repository list; a missing file is an empty list
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "repository file not found, using empty list");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| RepoError::InvalidRepositoryFile {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Get a repository by name
    pub fn get(&self, name: &str) -> Option<&RepositoryEntry> {
        self.repositories.iter().find(|r| r.name == name)
    }

    /// Find a repository whose URL matches, ignoring trailing slashes
    pub fn find_by_url(&self, url: &str) -> Option<&RepositoryEntry> {
        let wanted = url.trim_end_matches('/');
        self.repositories
            .iter()
            .find(|r| r.url.trim_end_matches('/') == wanted)
    }
}

/// Filesystem locations used by the Helm client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelmPaths {
    /// Path to `repositories.yaml`
    pub repository_config: PathBuf,
}

impl HelmPaths {
    /// Resolve paths for a Helm major version from environment values
    ///
    /// Helm 3 honours `HELM_REPOSITORY_CONFIG` and defaults to the user
    /// config directory; Helm 2 keeps everything under `HELM_HOME` (`~/.helm`).
    pub fn resolve<F>(version: HelmMajorVersion, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let repository_config = match version {
            HelmMajorVersion::V3 => match lookup("HELM_REPOSITORY_CONFIG") {
                Some(path) if !path.is_empty() => PathBuf::from(path),
                _ => {
                    let config_dir = dirs::config_dir().ok_or_else(|| RepoError::InvalidConfig {
                        message: "Could not determine config directory".to_string(),
                    })?;
                    config_dir.join("helm").join("repositories.yaml")
                }
            },
            HelmMajorVersion::V2 => {
                let home = match lookup("HELM_HOME") {
                    Some(home) if !home.is_empty() => PathBuf::from(home),
                    _ => {
                        let home = dirs::home_dir().ok_or_else(|| RepoError::InvalidConfig {
                            message: "Could not determine home directory".to_string(),
                        })?;
                        home.join(".helm")
                    }
                };
                home.join("repository").join("repositories.yaml")
            }
        };

        Ok(Self { repository_config })
    }
}

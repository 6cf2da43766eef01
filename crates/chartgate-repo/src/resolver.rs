//! Registry resolution
//!
//! Turns the repository argument of a push into a [`RepoConfig`] and finds
//! the API context path a registry is mounted under.

use std::future::Future;
use std::path::{Path, PathBuf};

use crate::config::{RepoConfig, RepositoryFile};
use crate::error::{RepoError, Result};
use crate::index::RepositoryIndex;

/// Marker scheme for ChartMuseum repositories in the Helm repository list
pub const CM_SCHEME: &str = "cm://";

/// Resolves repository names and literal URLs
#[derive(Debug, Clone)]
pub struct RegistryResolver {
    repository_file: PathBuf,
}

impl RegistryResolver {
    pub fn new(repository_file: impl Into<PathBuf>) -> Self {
        Self {
            repository_file: repository_file.into(),
        }
    }

    pub fn repository_file(&self) -> &Path {
        &self.repository_file
    }

    /// Resolve a repository name or a literal `http(s)://` URL
    ///
    /// A URL yields a repository named after the URL, and the
    /// repository file is not read at all.
    pub fn resolve(&self, identifier: &str) -> Result<RepoConfig> {
        if is_registry_url(identifier) {
            tracing::debug!(url = identifier, "using literal repository URL");
            return Ok(RepoConfig::from_url(identifier));
        }

        let file = RepositoryFile::load(&self.repository_file)?;
        let entry = file
            .get(identifier)
            .ok_or_else(|| RepoError::RepositoryNotFound {
                name: identifier.to_string(),
            })?;

        tracing::debug!(name = identifier, url = %entry.url, "resolved repository");
        Ok(RepoConfig::from(entry))
    }

    /// Ask the registry for its context path
    ///
    /// `fetch_index` must return the raw `index.yaml` fetched without any
    /// context prefix. An index without `serverInfo` means no context path.
    pub async fn discover_context_path<F, Fut>(fetch_index: F) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>>>,
    {
        let body = fetch_index().await?;
        let index = RepositoryIndex::from_bytes(&body)?;

        if index.server_info.is_none() {
            tracing::warn!("registry index has no serverInfo, assuming empty context path");
        }

        let context_path = index.context_path().to_string();
        tracing::debug!(context_path = %context_path, "discovered context path");
        Ok(context_path)
    }
}

/// Check if an identifier is a literal `http://` or `https://` URL
pub fn is_registry_url(identifier: &str) -> bool {
    identifier.starts_with("http://") || identifier.starts_with("https://")
}

/// Replace the first `cm://` marker with a real scheme
pub fn normalize_scheme(url: &str, use_http: bool) -> String {
    let scheme = if use_http { "http://" } else { "https://" };
    url.replacen(CM_SCHEME, scheme, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const REPOS: &str = r#"apiVersion: v1
repositories:
- name: chartmuseum
  url: cm://charts.example.com/org
"#;

    #[test]
    fn test_url_never_reads_repository_file() {
        let resolver = RegistryResolver::new("/nonexistent/dir/repositories.yaml");
        let repo = resolver.resolve("https://charts.example.com").unwrap();
        assert_eq!(repo.name, "https://charts.example.com");
        assert_eq!(repo.url, "https://charts.example.com");

        // A malformed file must not matter for URLs either
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("repositories.yaml");
        std::fs::write(&path, "repositories: [broken").unwrap();
        let repo = RegistryResolver::new(&path).resolve("http://localhost:8080").unwrap();
        assert_eq!(repo.url, "http://localhost:8080");
    }

    #[test]
    fn test_resolve_by_name() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("repositories.yaml");
        std::fs::write(&path, REPOS).unwrap();

        let resolver = RegistryResolver::new(&path);
        let repo = resolver.resolve("chartmuseum").unwrap();
        assert_eq!(repo.name, "chartmuseum");
        assert_eq!(repo.url, "cm://charts.example.com/org");

        let err = resolver.resolve("nope").unwrap_err();
        insta::assert_snapshot!(err.to_string(), @r#"no repo named "nope" found"#);
    }

    #[test]
    fn test_cm_identifier_is_a_name() {
        let resolver = RegistryResolver::new("/nonexistent/repositories.yaml");
        let err = resolver.resolve("cm://charts.example.com").unwrap_err();
        assert!(matches!(err, RepoError::RepositoryNotFound { .. }));
    }

    #[test]
    fn test_normalize_scheme() {
        assert_eq!(
            normalize_scheme("cm://charts.example.com/cm://x", false),
            "https://charts.example.com/cm://x"
        );
        assert_eq!(
            normalize_scheme("cm://localhost:8080", true),
            "http://localhost:8080"
        );
        assert_eq!(
            normalize_scheme("https://charts.example.com", true),
            "https://charts.example.com"
        );
    }

    #[tokio::test]
    async fn test_discover_context_path() {
        let path = RegistryResolver::discover_context_path(|| async {
            Ok(b"apiVersion: v1\nentries: {}\nserverInfo:\n  contextPath: /helm/v1\n".to_vec())
        })
        .await
        .unwrap();
        assert_eq!(path, "/helm/v1");

        let path = RegistryResolver::discover_context_path(|| async {
            Ok(b"apiVersion: v1\nentries: {}\n".to_vec())
        })
        .await
        .unwrap();
        assert_eq!(path, "");
    }

    #[tokio::test]
    async fn test_discover_context_path_errors() {
        let err = RegistryResolver::discover_context_path(|| async {
            Err(RepoError::from_response(500, b"boom"))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, RepoError::Registry { status: 500, .. }));

        let err = RegistryResolver::discover_context_path(|| async { Ok(b"{{{".to_vec()) })
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::IndexParse { .. }));
    }
}

//! chartgate Registry Client
//!
//! This crate talks to ChartMuseum-compatible registries sitting behind an
//! access gateway:
//!
//! - **AccessClient**: uploads and downloads with `CF-Access-Client-*` headers and TLS material
//! - **RegistryResolver**: repository names or literal URLs to a concrete registry
//! - **Dependency updates**: Helm 2 and Helm 3 style `charts/` refresh with lock files
//!
//! ## Example
//!
//! ```rust,no_run
//! use chartgate_repo::{AccessClient, ClientConfig, RegistryResolver, normalize_scheme};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let resolver = RegistryResolver::new("/home/me/.config/helm/repositories.yaml");
//! let repo = resolver.resolve("chartmuseum")?;
//!
//! let config = ClientConfig::new(normalize_scheme(&repo.url, false))
//!     .with_credentials(Some("id".into()), Some("secret".into()));
//! let client = AccessClient::new(config)?;
//!
//! let response = client
//!     .upload_package(std::path::Path::new("mychart-0.1.0.tgz"), false)
//!     .await?;
//! println!("{}", response.status);
//! # Ok(())
//! # }
//! ```
//!
//! ## Security Notes
//!
//! - Credentials are NEVER sent after cross-origin redirects
//! - Dependency archives are checked against the index digest

pub mod client;
pub mod config;
pub mod dependency;
pub mod error;
pub mod index;
pub mod lock;
pub mod resolver;
pub mod version;

// Re-exports for convenience
pub use client::{
    AccessClient, CLIENT_ID_HEADER, CLIENT_SECRET_HEADER, ClientConfig, RegistryResponse,
};
pub use config::{HelmPaths, RepoConfig, RepositoryEntry, RepositoryFile, TlsOptions};
pub use dependency::{
    DependencyManager, DependencyOptions, DependencyUpdater, LegacyDependencyManager,
    UpdateSummary, dependency_updater,
};
pub use error::{RepoError, Result};
pub use index::{ChartVersion, RepositoryIndex, ServerInfo};
pub use lock::{LockFile, LockedDependency};
pub use resolver::{CM_SCHEME, RegistryResolver, is_registry_url, normalize_scheme};
pub use version::HelmMajorVersion;

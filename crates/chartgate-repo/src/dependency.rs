//! Chart dependency updates
//!
//! Fills a chart's `charts/` directory from its declared dependencies and
//! writes the lock file. Helm 2 charts declare dependencies in
//! `requirements.yaml`, Helm 3 charts in `Chart.yaml`; both managers sit
//! behind [`DependencyUpdater`].
//!
//! Key properties:
//! - **Staged**: every archive is fetched into a temp dir before `charts/` is touched
//! - **Verified**: index digests are checked against downloaded bytes
//! - **Same identity**: downloads carry the push's access credentials and TLS settings

use async_trait::async_trait;
use chartgate_core::{
    ChartDependency, LoadedChart, create_chart_package, is_chart_dir, load_requirements,
};
use semver::Version;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use url::Url;

use crate::client::{AccessClient, ClientConfig, RegistryResponse};
use crate::config::{RepositoryEntry, RepositoryFile};
use crate::error::{RepoError, Result};
use crate::index::{RepositoryIndex, parse_constraint};
use crate::lock::{
    CHART_LOCK, LockFile, LockedDependency, REQUIREMENTS_LOCK, compute_sha256, digest_matches,
};
use crate::resolver::normalize_scheme;
use crate::version::HelmMajorVersion;

/// Directory holding a chart's dependencies
pub const CHARTS_DIR: &str = "charts";

/// Settings shared by both dependency managers
#[derive(Debug, Clone, Default)]
pub struct DependencyOptions {
    /// Repository list used for `@name` and `alias:name` references
    pub repository_file: PathBuf,

    /// Credentials and TLS settings; the base URL is replaced per repository
    pub client: ClientConfig,

    /// Map `cm://` to `http://` instead of `https://`
    pub use_http: bool,
}

/// Outcome of a dependency update
#[derive(Debug, Clone, Default)]
pub struct UpdateSummary {
    pub dependencies: Vec<LockedDependency>,
    /// Written lock file, if the chart declares any dependency
    pub lock_file: Option<PathBuf>,
}

/// Refreshes the `charts/` directory of a chart
#[async_trait]
pub trait DependencyUpdater: Send + Sync {
    /// Resolve, download and lock the dependencies of `chart_dir`
    async fn update(&self, chart_dir: &Path) -> Result<UpdateSummary>;
}

/// Pick the dependency manager for a Helm major version
pub fn dependency_updater(
    version: HelmMajorVersion,
    options: DependencyOptions,
) -> Box<dyn DependencyUpdater> {
    match version {
        HelmMajorVersion::V2 => Box::new(LegacyDependencyManager::new(options)),
        HelmMajorVersion::V3 => Box::new(DependencyManager::new(options)),
    }
}

/// Helm 2 manager: `requirements.yaml` / `requirements.lock`
#[derive(Debug, Clone)]
pub struct LegacyDependencyManager {
    options: DependencyOptions,
}

impl LegacyDependencyManager {
    pub fn new(options: DependencyOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl DependencyUpdater for LegacyDependencyManager {
    async fn update(&self, chart_dir: &Path) -> Result<UpdateSummary> {
        is_chart_dir(chart_dir)?;
        let declared = load_requirements(chart_dir)?;
        update_dependencies(chart_dir, &declared, REQUIREMENTS_LOCK, &self.options).await
    }
}

/// Helm 3 manager: `Chart.yaml` / `Chart.lock`
///
/// Charts still on `apiVersion: v1` keep their legacy dependency files.
#[derive(Debug, Clone)]
pub struct DependencyManager {
    options: DependencyOptions,
}

impl DependencyManager {
    pub fn new(options: DependencyOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl DependencyUpdater for DependencyManager {
    async fn update(&self, chart_dir: &Path) -> Result<UpdateSummary> {
        let metadata = is_chart_dir(chart_dir)?;

        if metadata.api_version.as_deref() == Some("v1") {
            let declared = load_requirements(chart_dir)?;
            return update_dependencies(chart_dir, &declared, REQUIREMENTS_LOCK, &self.options)
                .await;
        }

        update_dependencies(chart_dir, &metadata.dependencies, CHART_LOCK, &self.options).await
    }
}

/// Where a dependency comes from, per its `repository` field
#[derive(Debug, Clone, PartialEq, Eq)]
enum DependencySource<'a> {
    /// Empty repository: already vendored in `charts/`
    Vendored,
    /// `file://<path>` relative to the chart
    File(&'a str),
    /// `@name` or `alias:name` from the repository list
    Named(&'a str),
    /// Repository URL
    Url(&'a str),
}

impl<'a> DependencySource<'a> {
    fn parse(repository: &'a str) -> Self {
        let repository = repository.trim();
        if repository.is_empty() {
            DependencySource::Vendored
        } else if let Some(path) = repository.strip_prefix("file://") {
            DependencySource::File(path)
        } else if let Some(name) = repository
            .strip_prefix('@')
            .or_else(|| repository.strip_prefix("alias:"))
        {
            DependencySource::Named(name)
        } else {
            DependencySource::Url(repository)
        }
    }
}

/// Archive fetched into the staging directory
struct StagedArchive {
    dependency: String,
    path: PathBuf,
}

async fn update_dependencies(
    chart_dir: &Path,
    declared: &[ChartDependency],
    lock_name: &str,
    options: &DependencyOptions,
) -> Result<UpdateSummary> {
    if declared.is_empty() {
        tracing::debug!(chart = %chart_dir.display(), "no dependencies declared");
        return Ok(UpdateSummary::default());
    }

    let charts_dir = chart_dir.join(CHARTS_DIR);
    let staging = tempfile::Builder::new()
        .prefix("chartgate-deps-")
        .tempdir()?;

    let mut fetcher = Fetcher::new(options);
    let mut locked = Vec::with_capacity(declared.len());
    let mut staged = Vec::new();

    for dep in declared {
        tracing::debug!(name = %dep.name, version = %dep.version, repository = %dep.repository, "resolving dependency");

        match DependencySource::parse(&dep.repository) {
            DependencySource::Vendored => {
                ensure_vendored(&charts_dir, dep)?;
                locked.push(LockedDependency {
                    name: dep.name.clone(),
                    version: dep.version.clone(),
                    repository: dep.repository.clone(),
                });
            }
            DependencySource::File(path) => {
                let (version, archive) = package_local(chart_dir, path, dep, staging.path())?;
                staged.push(StagedArchive {
                    dependency: dep.name.clone(),
                    path: archive,
                });
                locked.push(LockedDependency {
                    name: dep.name.clone(),
                    version,
                    repository: dep.repository.clone(),
                });
            }
            DependencySource::Named(name) => {
                let entry = fetcher.repository(name)?;
                let (version, archive) = fetcher
                    .fetch(dep, &entry.url, Some(&entry), staging.path())
                    .await?;
                staged.push(StagedArchive {
                    dependency: dep.name.clone(),
                    path: archive,
                });
                locked.push(LockedDependency {
                    name: dep.name.clone(),
                    version,
                    repository: dep.repository.clone(),
                });
            }
            DependencySource::Url(url) => {
                let entry = fetcher.repository_for_url(url)?;
                let (version, archive) = fetcher
                    .fetch(dep, url, entry.as_ref(), staging.path())
                    .await?;
                staged.push(StagedArchive {
                    dependency: dep.name.clone(),
                    path: archive,
                });
                locked.push(LockedDependency {
                    name: dep.name.clone(),
                    version,
                    repository: dep.repository.clone(),
                });
            }
        }
    }

    // Everything is staged, now replace charts/ contents
    std::fs::create_dir_all(&charts_dir)?;
    for archive in &staged {
        remove_stale_archives(&charts_dir, &archive.dependency)?;
    }
    for archive in &staged {
        let file_name = archive
            .path
            .file_name()
            .ok_or_else(|| RepoError::dependency("staged archive has no file name"))?;
        std::fs::copy(&archive.path, charts_dir.join(file_name))?;
    }

    let lock_path = chart_dir.join(lock_name);
    LockFile::new(declared, locked.clone())?.save(&lock_path)?;
    tracing::debug!(lock = %lock_path.display(), count = locked.len(), "dependencies updated");

    Ok(UpdateSummary {
        dependencies: locked,
        lock_file: Some(lock_path),
    })
}

/// A dependency without repository must already be in `charts/`
fn ensure_vendored(charts_dir: &Path, dep: &ChartDependency) -> Result<()> {
    if charts_dir.join(&dep.name).is_dir() || !archives_for(charts_dir, &dep.name)?.is_empty() {
        return Ok(());
    }
    Err(RepoError::dependency(format!(
        "dependency {} has no repository and was not found in {}",
        dep.name,
        charts_dir.display()
    )))
}

/// Package a `file://` dependency into the staging directory
fn package_local(
    chart_dir: &Path,
    path: &str,
    dep: &ChartDependency,
    staging: &Path,
) -> Result<(String, PathBuf)> {
    let source = chart_dir.join(path);
    let chart = LoadedChart::load(&source).map_err(|e| {
        RepoError::dependency(format!(
            "cannot load local dependency {} from {}: {}",
            dep.name,
            source.display(),
            e
        ))
    })?;

    ensure_matches(&dep.name, &dep.version, chart.version())?;
    let archive = create_chart_package(&chart, staging)?;
    Ok((chart.version().to_string(), archive))
}

fn ensure_matches(name: &str, constraint: &str, version: &str) -> Result<()> {
    let reqs = parse_constraint(constraint)?;
    let matches = Version::parse(version.trim_start_matches('v'))
        .map(|v| reqs.iter().any(|req| req.matches(&v)))
        .unwrap_or(false);

    if matches {
        Ok(())
    } else {
        Err(RepoError::UnsatisfiableConstraint {
            name: name.to_string(),
            constraint: constraint.to_string(),
            available: version.to_string(),
        })
    }
}

/// Downloads dependency archives from chart repositories
struct Fetcher<'a> {
    options: &'a DependencyOptions,
    repositories: Option<RepositoryFile>,
    indexes: HashMap<String, RepositoryIndex>,
}

impl<'a> Fetcher<'a> {
    fn new(options: &'a DependencyOptions) -> Self {
        Self {
            options,
            repositories: None,
            indexes: HashMap::new(),
        }
    }

    /// The repository list, read on first use
    fn repositories(&mut self) -> Result<&RepositoryFile> {
        let file = match self.repositories.take() {
            Some(file) => file,
            None => RepositoryFile::load(&self.options.repository_file)?,
        };
        let file: &RepositoryFile = self.repositories.insert(file);
        Ok(file)
    }

    /// Look up a repository by name
    fn repository(&mut self, name: &str) -> Result<RepositoryEntry> {
        self.repositories()?
            .get(name)
            .cloned()
            .ok_or_else(|| RepoError::RepositoryNotFound {
                name: name.to_string(),
            })
    }

    /// Registered repository serving `url`, whose TLS settings then apply
    fn repository_for_url(&mut self, url: &str) -> Result<Option<RepositoryEntry>> {
        Ok(self.repositories()?.find_by_url(url).cloned())
    }

    fn client_for(&self, base_url: &str, entry: Option<&RepositoryEntry>) -> Result<AccessClient> {
        let mut config = self.options.client.clone();
        config.base_url = base_url.to_string();
        config.context_path = String::new();

        if let Some(entry) = entry {
            config.ca_file = config.ca_file.or_else(|| entry.ca_file.clone());
            if config.cert_file.is_none() && config.key_file.is_none() {
                config.cert_file = entry.cert_file.clone();
                config.key_file = entry.key_file.clone();
            }
            config.insecure_skip_verify |= entry.insecure_skip_tls_verify;
        }

        AccessClient::new(config)
    }

    /// Resolve, download and verify one dependency into `staging`
    async fn fetch(
        &mut self,
        dep: &ChartDependency,
        repository_url: &str,
        entry: Option<&RepositoryEntry>,
        staging: &Path,
    ) -> Result<(String, PathBuf)> {
        let base_url = normalize_scheme(repository_url, self.options.use_http);
        let client = self.client_for(&base_url, entry)?;

        if !self.indexes.contains_key(&base_url) {
            let body = client.fetch_index().await?;
            self.indexes
                .insert(base_url.clone(), RepositoryIndex::from_bytes(&body)?);
        }
        let index = self
            .indexes
            .get(&base_url)
            .ok_or_else(|| RepoError::dependency(format!("no index for {}", base_url)))?;

        let chart = index.find_best_match(&dep.name, &dep.version)?;
        let download_url = chart.download_url().ok_or_else(|| {
            RepoError::dependency(format!(
                "chart {} {} has no download URL",
                chart.name, chart.version
            ))
        })?;
        let download_url = resolve_chart_url(&base_url, download_url, self.options.use_http)?;

        tracing::debug!(name = %chart.name, version = %chart.version, url = %download_url, "downloading dependency");
        let response = client.get(download_url.as_str()).await?;
        let data = RegistryResponse::read(response).await?.expect_status(200)?;

        if let Some(expected) = chart.digest.as_deref()
            && !expected.is_empty()
            && !digest_matches(expected, &data)
        {
            return Err(RepoError::IntegrityCheckFailed {
                name: chart.name.clone(),
                expected: expected.to_string(),
                actual: compute_sha256(&data),
            });
        }

        let path = staging.join(format!("{}-{}.tgz", chart.name, chart.version));
        std::fs::write(&path, &data)?;
        Ok((chart.version.clone(), path))
    }
}

/// Resolve an index URL, which may be relative to the repository
fn resolve_chart_url(base_url: &str, chart_url: &str, use_http: bool) -> Result<Url> {
    let chart_url = normalize_scheme(chart_url, use_http);
    if let Ok(url) = Url::parse(&chart_url) {
        return Ok(url);
    }

    let base = Url::parse(&format!("{}/", base_url.trim_end_matches('/'))).map_err(|e| {
        RepoError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        }
    })?;
    Ok(base.join(&chart_url)?)
}

/// Archives in `charts/` belonging to a dependency (`<name>-<version>.tgz`)
fn archives_for(charts_dir: &Path, name: &str) -> Result<Vec<PathBuf>> {
    if !charts_dir.is_dir() {
        return Ok(Vec::new());
    }

    let prefix = format!("{}-", name);
    let mut archives = Vec::new();
    for entry in std::fs::read_dir(charts_dir)? {
        let path = entry?.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let is_match = file_name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(".tgz"))
            .is_some_and(|version| version.starts_with(|c: char| c.is_ascii_digit()));
        if is_match && path.is_file() {
            archives.push(path);
        }
    }
    Ok(archives)
}

fn remove_stale_archives(charts_dir: &Path, name: &str) -> Result<()> {
    for path in archives_for(charts_dir, name)? {
        tracing::debug!(path = %path.display(), "removing stale dependency archive");
        std::fs::remove_file(path)?;
    }
    Ok(())
}

//! Push command - package a chart and upload it to a ChartMuseum registry

use std::io::Write;
use std::path::{Path, PathBuf};

use chartgate_core::{LoadedChart, create_chart_package, is_chart_dir};
use chartgate_repo::{
    AccessClient, DependencyOptions, HelmMajorVersion, RegistryResolver, TlsOptions,
    dependency_updater, normalize_scheme,
};

use crate::error::{CliError, Result};
use crate::settings::PushOptions;

/// Runs one push from repository resolution to the registry's answer
pub struct PushOrchestrator {
    options: PushOptions,
    resolver: RegistryResolver,
    helm_version: HelmMajorVersion,
    temp_root: Option<PathBuf>,
}

impl PushOrchestrator {
    pub fn new(options: PushOptions, resolver: RegistryResolver, helm_version: HelmMajorVersion) -> Self {
        Self {
            options,
            resolver,
            helm_version,
            temp_root: None,
        }
    }

    /// Create the packaging directory under `root` instead of the system temp dir
    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    /// Run the push, writing progress lines to `out`
    pub async fn run(&self, out: &mut impl Write) -> Result<()> {
        let options = &self.options;
        let connection = &options.connection;

        let repo = self.resolver.resolve(&options.repository)?;

        if options.dependency_update {
            self.update_dependencies(&options.chart, out).await?;
        }

        let mut chart = LoadedChart::load(&options.chart)?;
        if let Some(version) = &options.version {
            chart.set_version(version.clone());
        }
        if let Some(app_version) = &options.app_version {
            chart.set_app_version(app_version.clone());
        }

        let url = normalize_scheme(&repo.url, connection.use_http);
        let mut client = AccessClient::new(connection.client_config(&url, &repo.tls))?;

        if connection.context_path.is_none() {
            let context_path = RegistryResolver::discover_context_path(|| client.fetch_index()).await?;
            client.with_context_path(context_path);
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix("helm-push-");
        let temp_dir = match &self.temp_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };

        let archive = create_chart_package(&chart, temp_dir.path())?;
        let file_name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| CliError::packaging("packaged chart has no file name"))?;

        writeln!(out, "Pushing {} to {}...", file_name, repo.name)?;
        let response = client.upload_package(&archive, options.force).await?;
        response.expect_status(201)?;
        writeln!(out, "Done.")?;

        Ok(())
    }

    /// Refresh `charts/` of a chart directory; archives are left alone
    async fn update_dependencies(&self, chart: &Path, out: &mut impl Write) -> Result<()> {
        if !std::fs::metadata(chart)?.is_dir() {
            return Ok(());
        }
        is_chart_dir(chart)?;
        let chart_dir = std::path::absolute(chart)?;

        let dependency_options = DependencyOptions {
            repository_file: self.resolver.repository_file().to_path_buf(),
            client: self
                .options
                .connection
                .client_config("", &TlsOptions::default()),
            use_http: self.options.connection.use_http,
        };

        tracing::debug!(
            chart = %chart_dir.display(),
            helm = %self.helm_version,
            keyring = %self.options.keyring.display(),
            "updating dependencies, archives are not signature-checked"
        );
        let summary = dependency_updater(self.helm_version, dependency_options)
            .update(&chart_dir)
            .await
            .map_err(|e| CliError::dependency(e.to_string()))?;

        if summary.dependencies.is_empty() {
            return Ok(());
        }

        writeln!(out, "Saving {} charts", summary.dependencies.len())?;
        for dep in &summary.dependencies {
            tracing::debug!(name = %dep.name, version = %dep.version, "dependency locked");
            if !dep.repository.is_empty() && !dep.repository.starts_with("file://") {
                writeln!(out, "Downloading {} from repo {}", dep.name, dep.repository)?;
            }
        }
        writeln!(out, "Deleting outdated charts")?;
        Ok(())
    }
}

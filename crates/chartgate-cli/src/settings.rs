//! Command-line and environment settings
//!
//! Flags are parsed by clap; the `HELM_REPO_*` environment variables Helm
//! hands to plugins are folded in afterwards. Everything ends up in plain
//! values passed to the commands, nothing is read from the process later.

use chartgate_repo::{ClientConfig, HelmMajorVersion, HelmPaths, TlsOptions};
use clap::Parser;
use std::path::PathBuf;

use crate::error::{CliError, Result};

/// Message for a push invoked with the wrong number of arguments
pub const ARGUMENT_COUNT_MESSAGE: &str =
    "This command needs 2 arguments: name of chart, name of chart repository (or repo URL)";

const USAGE_EXAMPLES: &str = r#"Examples:

  $ helm push mychart-0.1.0.tgz chartmuseum       # push .tgz from "helm package"
  $ helm push . chartmuseum                       # package and push chart directory
  $ helm push . --version="7c4d121" chartmuseum   # override version in Chart.yaml
  $ helm push . https://my.chart.repo.com         # push directly to chart repo URL"#;

#[derive(Parser, Debug, Default, Clone, PartialEq, Eq)]
#[command(name = "chartgate")]
#[command(about = "Helm plugin to push chart package to ChartMuseum", long_about = None)]
#[command(after_help = USAGE_EXAMPLES)]
#[command(disable_version_flag = true)]
pub struct PushArgs {
    /// Chart directory or archive, then repository name or URL
    #[arg(value_name = "ARGS")]
    pub args: Vec<String>,

    /// Override chart version pre-push
    #[arg(short = 'v', long = "version")]
    pub version: Option<String>,

    /// Override app version pre-push
    #[arg(short = 'a', long)]
    pub app_version: Option<String>,

    /// Access client ID [$HELM_REPO_CLIENT_ID]
    #[arg(long)]
    pub client_id: Option<String>,

    /// Access client secret [$HELM_REPO_CLIENT_SECRET]
    #[arg(long)]
    pub client_secret: Option<String>,

    /// ChartMuseum context path [$HELM_REPO_CONTEXT_PATH]
    #[arg(long)]
    pub context_path: Option<String>,

    /// Verify certificates of HTTPS-enabled servers using this CA bundle [$HELM_REPO_CA_FILE]
    #[arg(long)]
    pub ca_file: Option<PathBuf>,

    /// Identify HTTPS client using this SSL certificate file [$HELM_REPO_CERT_FILE]
    #[arg(long)]
    pub cert_file: Option<PathBuf>,

    /// Identify HTTPS client using this SSL key file [$HELM_REPO_KEY_FILE]
    #[arg(long)]
    pub key_file: Option<PathBuf>,

    /// Location of a public keyring
    #[arg(long)]
    pub keyring: Option<PathBuf>,

    /// Skip server certificate verification [$HELM_REPO_INSECURE]
    #[arg(long)]
    pub insecure: bool,

    /// Force upload even if chart version exists
    #[arg(short = 'f', long)]
    pub force: bool,

    /// Update dependencies into charts/ before packaging
    #[arg(short = 'd', long)]
    pub dependency_update: bool,

    /// Print "2" or "3", the current Helm major version
    #[arg(long)]
    pub check_helm_version: bool,

    /// Enable debug output
    #[arg(long)]
    pub debug: bool,
}

/// `HELM_*` environment variables relevant to the plugin
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSettings {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub context_path: Option<String>,
    pub ca_file: Option<String>,
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
    /// `HELM_REPO_USE_HTTP`, when set
    pub use_http: Option<bool>,
    /// `HELM_REPO_INSECURE`, when set
    pub insecure: Option<bool>,
    pub debug: bool,
    pub helm_home: Option<String>,
    pub repository_config: Option<String>,
}

impl EnvSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`
    ///
    /// A boolean variable that is set but not a recognised boolean reads as
    /// false, like Go's `strconv.ParseBool` with its error ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| lookup(key).map(|v| parse_bool(&v).unwrap_or(false));

        Self {
            client_id: lookup("HELM_REPO_CLIENT_ID"),
            client_secret: lookup("HELM_REPO_CLIENT_SECRET"),
            context_path: lookup("HELM_REPO_CONTEXT_PATH"),
            ca_file: lookup("HELM_REPO_CA_FILE"),
            cert_file: lookup("HELM_REPO_CERT_FILE"),
            key_file: lookup("HELM_REPO_KEY_FILE"),
            use_http: flag("HELM_REPO_USE_HTTP"),
            insecure: flag("HELM_REPO_INSECURE"),
            debug: flag("HELM_DEBUG").unwrap_or(false),
            helm_home: lookup("HELM_HOME"),
            repository_config: lookup("HELM_REPOSITORY_CONFIG"),
        }
    }

    /// Helm file locations for a Helm major version
    pub fn helm_paths(&self, version: HelmMajorVersion) -> Result<HelmPaths> {
        Ok(HelmPaths::resolve(version, |key| match key {
            "HELM_HOME" => self.helm_home.clone(),
            "HELM_REPOSITORY_CONFIG" => self.repository_config.clone(),
            _ => None,
        })?)
    }
}

/// Go `strconv.ParseBool` vocabulary
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Registry connection settings after merging flags and environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub context_path: Option<String>,
    pub tls: TlsOptions,
    /// Map `cm://` to `http://` instead of `https://`
    pub use_http: bool,
}

impl ConnectionOptions {
    /// Merge flags with the environment
    ///
    /// String variables only fill flags left empty; boolean variables
    /// override the flag whenever they are set.
    pub fn merge(args: &PushArgs, env: &EnvSettings) -> Self {
        fn fill(flag: &Option<String>, env: &Option<String>) -> Option<String> {
            flag.clone()
                .filter(|v| !v.is_empty())
                .or_else(|| env.clone().filter(|v| !v.is_empty()))
        }
        fn fill_path(flag: &Option<PathBuf>, env: &Option<String>) -> Option<PathBuf> {
            flag.clone()
                .filter(|p| !p.as_os_str().is_empty())
                .or_else(|| env.as_ref().filter(|v| !v.is_empty()).map(PathBuf::from))
        }

        Self {
            client_id: fill(&args.client_id, &env.client_id),
            client_secret: fill(&args.client_secret, &env.client_secret),
            context_path: fill(&args.context_path, &env.context_path),
            tls: TlsOptions {
                ca_file: fill_path(&args.ca_file, &env.ca_file),
                cert_file: fill_path(&args.cert_file, &env.cert_file),
                key_file: fill_path(&args.key_file, &env.key_file),
                insecure_skip_verify: env.insecure.unwrap_or(args.insecure),
            },
            use_http: env.use_http.unwrap_or(false),
        }
    }

    /// Client settings for a registry base URL
    ///
    /// TLS files of a repository entry apply only where nothing was given
    /// explicitly.
    pub fn client_config(&self, base_url: &str, repository_tls: &TlsOptions) -> ClientConfig {
        let mut tls = self.tls.clone();
        if tls.ca_file.is_none() {
            tls.ca_file = repository_tls.ca_file.clone();
        }
        if tls.cert_file.is_none() && tls.key_file.is_none() {
            tls.cert_file = repository_tls.cert_file.clone();
            tls.key_file = repository_tls.key_file.clone();
        }
        tls.insecure_skip_verify |= repository_tls.insecure_skip_verify;

        ClientConfig::new(base_url)
            .with_context_path(self.context_path.clone().unwrap_or_default())
            .with_credentials(self.client_id.clone(), self.client_secret.clone())
            .with_tls(&tls)
    }
}

/// Everything a push needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOptions {
    /// Chart directory or archive
    pub chart: PathBuf,
    /// Repository name or `http(s)://` URL
    pub repository: String,
    pub version: Option<String>,
    pub app_version: Option<String>,
    pub force: bool,
    pub dependency_update: bool,
    /// Accepted for compatibility; charts are not verified
    pub keyring: PathBuf,
    pub connection: ConnectionOptions,
}

/// Everything a `cm://` download needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOptions {
    /// `cm://host/path/file.tgz` as handed over by Helm
    pub url: String,
    pub connection: ConnectionOptions,
}

/// What this process was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// Print the Helm major version
    CheckHelmVersion,
    /// Act as Helm's downloader for `cm://` URLs
    Download(DownloadOptions),
    /// Package and upload a chart
    Push(PushOptions),
}

impl Invocation {
    /// Decide the mode from positional arguments
    ///
    /// Helm calls downloader plugins with `certFile keyFile caFile URL`, so
    /// four arguments ending in a `cm://` URL mean download mode.
    pub fn from_args(args: PushArgs, env: &EnvSettings) -> Result<Self> {
        if args.check_helm_version {
            return Ok(Invocation::CheckHelmVersion);
        }

        let connection = ConnectionOptions::merge(&args, env);

        if let [_, _, _, url] = args.args.as_slice()
            && url.starts_with(chartgate_repo::CM_SCHEME)
        {
            return Ok(Invocation::Download(DownloadOptions {
                url: url.clone(),
                connection,
            }));
        }

        let [chart, repository] = args.args.as_slice() else {
            return Err(CliError::usage_with_help(ARGUMENT_COUNT_MESSAGE, USAGE_EXAMPLES));
        };

        Ok(Invocation::Push(PushOptions {
            chart: PathBuf::from(chart),
            repository: repository.clone(),
            version: args.version.filter(|v| !v.is_empty()),
            app_version: args.app_version.filter(|v| !v.is_empty()),
            force: args.force,
            dependency_update: args.dependency_update,
            keyring: args.keyring.unwrap_or_else(default_keyring),
            connection,
        }))
    }
}

/// `$HOME/.gnupg/pubring.gpg`
fn default_keyring() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".gnupg")
        .join("pubring.gpg")
}

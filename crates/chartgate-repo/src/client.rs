//! Access-broker authenticated registry client
//!
//! Talks to a ChartMuseum-compatible registry sitting behind an access gateway.
//! Every request to the registry origin carries the client ID/secret headers
//! and the configured TLS identity.
//!
//! Credentials are never forwarded after a cross-origin redirect: redirects
//! are followed manually and headers are only attached for the registry origin.

use reqwest::header::{HeaderMap, HeaderValue, LOCATION};
use reqwest::multipart::{Form, Part};
use reqwest::{Certificate, Identity, RequestBuilder, StatusCode};
use std::path::{Path, PathBuf};
use url::Url;

use crate::config::TlsOptions;
use crate::error::{RepoError, Result};

/// Header carrying the access-broker client ID
pub const CLIENT_ID_HEADER: &str = "CF-Access-Client-Id";

/// Header carrying the access-broker client secret
pub const CLIENT_SECRET_HEADER: &str = "CF-Access-Client-Secret";

const MAX_REDIRECTS: usize = 10;

/// Settings for an [`AccessClient`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientConfig {
    /// Registry base URL (`http` or `https`)
    pub base_url: String,
    /// API context path, empty for none
    pub context_path: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub ca_file: Option<PathBuf>,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub insecure_skip_verify: bool,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_context_path(mut self, context_path: impl Into<String>) -> Self {
        self.context_path = context_path.into();
        self
    }

    pub fn with_credentials(mut self, client_id: Option<String>, client_secret: Option<String>) -> Self {
        self.client_id = client_id;
        self.client_secret = client_secret;
        self
    }

    pub fn with_tls(mut self, tls: &TlsOptions) -> Self {
        self.ca_file = tls.ca_file.clone();
        self.cert_file = tls.cert_file.clone();
        self.key_file = tls.key_file.clone();
        self.insecure_skip_verify = tls.insecure_skip_verify;
        self
    }
}

/// Status and fully-read body of a registry response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RegistryResponse {
    /// Read a response to completion
    pub async fn read(response: reqwest::Response) -> Result<Self> {
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        Ok(Self { status, body })
    }

    /// Return the body when the status is `expected`, the registry error otherwise
    pub fn expect_status(self, expected: u16) -> Result<Vec<u8>> {
        if self.status == expected {
            Ok(self.body)
        } else {
            Err(RepoError::from_response(self.status, &self.body))
        }
    }
}

/// HTTP client for a single registry
#[derive(Debug, Clone)]
pub struct AccessClient {
    http: reqwest::Client,
    base_url: Url,
    context_path: String,
    auth_headers: HeaderMap,
}

impl AccessClient {
    /// Build a client, validating the URL and loading TLS material
    pub fn new(config: ClientConfig) -> Result<Self> {
        let base_url = parse_base_url(&config.base_url)?;
        let auth_headers = auth_headers(&config)?;

        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("chartgate/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(config.insecure_skip_verify);

        if let Some(ca_file) = &config.ca_file {
            let pem = read_tls_file(ca_file)?;
            let certs = Certificate::from_pem_bundle(&pem).map_err(|e| tls_error(ca_file, e))?;
            if certs.is_empty() {
                return Err(RepoError::TlsMaterial {
                    path: ca_file.display().to_string(),
                    message: "no certificates found".to_string(),
                });
            }
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }

        match (&config.cert_file, &config.key_file) {
            (Some(cert_file), Some(key_file)) => {
                let mut pem = read_tls_file(cert_file)?;
                pem.push(b'\n');
                pem.extend(read_tls_file(key_file)?);
                let identity = Identity::from_pem(&pem).map_err(|e| tls_error(cert_file, e))?;
                builder = builder.identity(identity);
            }
            (None, None) => {}
            _ => {
                return Err(RepoError::InvalidConfig {
                    message: "cert-file and key-file must be provided together".to_string(),
                });
            }
        }

        let http = builder.build()?;

        Ok(Self {
            http,
            base_url,
            context_path: config.context_path,
            auth_headers,
        })
    }

    /// Rebind the context path, typically after discovery
    pub fn with_context_path(&mut self, context_path: impl Into<String>) {
        self.context_path = context_path.into();
    }

    /// `{context}/api{base path}/charts`, with `?force` when overwriting
    pub fn upload_url(&self, force: bool) -> Url {
        let mut url = self.base_url.clone();
        let base_path = self.base_path();
        url.set_path(&join_path(&[&self.context_path, "api", &base_path, "charts"]));
        url.set_query(force.then_some("force"));
        url
    }

    /// `{context}{base path}/{relative_path}`
    pub fn file_url(&self, relative_path: &str) -> Url {
        let mut url = self.base_url.clone();
        let base_path = self.base_path();
        url.set_path(&join_path(&[&self.context_path, &base_path, relative_path]));
        url.set_query(None);
        url
    }

    /// Upload a chart archive
    ///
    /// The response is read to completion; interpreting the status is up to
    /// the caller (ChartMuseum answers 201 on create). 307 and 308 redirects
    /// re-send the archive, other redirects are returned as-is.
    pub async fn upload_package(&self, path: &Path, force: bool) -> Result<RegistryResponse> {
        let data = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "chart.tgz".to_string());

        let url = self.upload_url(force);
        tracing::debug!(url = %url, force, "uploading chart package");

        let response = self
            .send_following(url, preserves_method, |url| {
                let part = Part::bytes(data.clone()).file_name(file_name.clone());
                self.http.post(url).multipart(Form::new().part("chart", part))
            })
            .await?;

        RegistryResponse::read(response).await
    }

    /// GET a file relative to the registry root
    ///
    /// The caller owns the response body.
    pub async fn download_file(&self, relative_path: &str) -> Result<reqwest::Response> {
        let url = self.file_url(relative_path);
        tracing::debug!(url = %url, "downloading file");
        self.get_url(url).await
    }

    /// GET an absolute URL with the same identity as registry calls
    pub async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let url = Url::parse(url).map_err(|e| RepoError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        self.get_url(url).await
    }

    /// Fetch `index.yaml`, requiring a 200 response
    pub async fn fetch_index(&self) -> Result<Vec<u8>> {
        let response = self.download_file("index.yaml").await?;
        RegistryResponse::read(response).await?.expect_status(200)
    }

    async fn get_url(&self, url: Url) -> Result<reqwest::Response> {
        self.send_following(url, is_redirect, |url| self.http.get(url)).await
    }

    /// Send a request, following redirects whose status satisfies `follow`
    async fn send_following<F>(
        &self,
        url: Url,
        follow: fn(StatusCode) -> bool,
        request: F,
    ) -> Result<reqwest::Response>
    where
        F: Fn(Url) -> RequestBuilder,
    {
        let mut current = url;

        for _ in 0..=MAX_REDIRECTS {
            let response = self
                .authorize(request(current.clone()), &current)
                .send()
                .await?;

            if !follow(response.status()) {
                return Ok(response);
            }

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| RepoError::Transport {
                    message: format!("{} redirect without Location header", response.status()),
                })?;

            let next = current.join(location)?;
            if !same_origin(&self.base_url, &next) {
                tracing::warn!(
                    "Cross-origin redirect from {} to {} - credentials not forwarded",
                    current,
                    next
                );
            }
            current = next;
        }

        Err(RepoError::Transport {
            message: format!("Too many redirects (max {})", MAX_REDIRECTS),
        })
    }

    fn authorize(&self, request: RequestBuilder, url: &Url) -> RequestBuilder {
        if same_origin(&self.base_url, url) {
            request.headers(self.auth_headers.clone())
        } else {
            request
        }
    }

    /// Path of the base URL outside the context path
    fn base_path(&self) -> String {
        let path = self.base_url.path();
        let context = self.context_path.trim_end_matches('/');
        if context.is_empty() {
            path.to_string()
        } else {
            path.strip_prefix(context).unwrap_or(path).to_string()
        }
    }
}

/// Redirects a GET follows; 300 and 304 are final answers
fn is_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

/// Redirects that keep the method and body
fn preserves_method(status: StatusCode) -> bool {
    matches!(status.as_u16(), 307 | 308)
}

/// Check if two URLs share scheme, host and port
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host() == b.host()
        && a.port_or_known_default() == b.port_or_known_default()
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| RepoError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") || url.host().is_none() {
        return Err(RepoError::InvalidUrl {
            url: raw.to_string(),
            reason: "URL must be an absolute http:// or https:// URL".to_string(),
        });
    }

    Ok(url)
}

fn auth_headers(config: &ClientConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();

    let pairs = [
        (CLIENT_ID_HEADER, &config.client_id),
        (CLIENT_SECRET_HEADER, &config.client_secret),
    ];
    for (name, value) in pairs {
        let Some(value) = value.as_deref().filter(|v| !v.is_empty()) else {
            continue;
        };
        let mut value = HeaderValue::from_str(value).map_err(|_| RepoError::InvalidConfig {
            message: format!("{} contains characters not allowed in a header", name),
        })?;
        value.set_sensitive(true);
        headers.insert(name, value);
    }

    Ok(headers)
}

fn read_tls_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| tls_error(path, e))
}

fn tls_error(path: &Path, e: impl std::fmt::Display) -> RepoError {
    RepoError::TlsMaterial {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

/// Join URL path segments, dropping empty parts and duplicate slashes
fn join_path(segments: &[&str]) -> String {
    let parts: Vec<&str> = segments
        .iter()
        .flat_map(|s| s.split('/'))
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    format!("/{}", parts.join("/"))
}

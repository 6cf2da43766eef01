//! Download command - Helm downloader for `cm://` URLs
//!
//! Helm runs the plugin as `chartgate certFile keyFile caFile cm://host/path/file.tgz`
//! and reads the file from stdout. The first three arguments are ignored;
//! TLS settings come from flags and `HELM_REPO_*` variables like a push.

use std::io::Write;

use chartgate_repo::{AccessClient, RegistryResponse, RepoError, TlsOptions};
use url::Url;

use crate::error::Result;
use crate::settings::DownloadOptions;

/// Split a `cm://` path into the repository path and the file to fetch
///
/// Files under `charts/` keep that prefix: `/a/b/charts/foo-1.0.0.tgz`
/// becomes (`/a/b`, `charts/foo-1.0.0.tgz`). Paths without at least one
/// `/` separator are rejected.
pub fn split_download_path(path: &str) -> Option<(String, String)> {
    let parts: Vec<&str> = path.split('/').collect();
    let [.., parent, file] = parts.as_slice() else {
        return None;
    };

    let (keep, file_path) = if *parent == "charts" {
        (parts.len() - 2, format!("charts/{}", file))
    } else {
        (parts.len() - 1, file.to_string())
    };

    Some((parts[..keep].join("/"), file_path))
}

/// Registry base URL and relative file path for a `cm://` URL
pub fn resolve_download(raw_url: &str, use_http: bool) -> Result<(String, String)> {
    let invalid = || RepoError::InvalidFileUrl {
        url: raw_url.to_string(),
    };

    let url = Url::parse(raw_url).map_err(|_| invalid())?;
    let (base_path, file_path) = split_download_path(url.path()).ok_or_else(invalid)?;
    let host = url.host_str().ok_or_else(invalid)?;

    let scheme = if use_http { "http" } else { "https" };
    let port = url.port().map(|p| format!(":{}", p)).unwrap_or_default();

    Ok((format!("{}://{}{}{}", scheme, host, port, base_path), file_path))
}

/// Fetch the file and copy it verbatim to `out`
pub async fn run(options: &DownloadOptions, out: &mut impl Write) -> Result<()> {
    let connection = &options.connection;
    let (base_url, file_path) = resolve_download(&options.url, connection.use_http)?;

    tracing::debug!(base_url = %base_url, file = %file_path, "downloading through registry");
    let client = AccessClient::new(connection.client_config(&base_url, &TlsOptions::default()))?;
    let mut response = client.download_file(&file_path).await?;

    if response.status().as_u16() != 200 {
        let response = RegistryResponse::read(response).await?;
        return Err(RepoError::from_response(response.status, &response.body).into());
    }

    while let Some(chunk) = response.chunk().await.map_err(RepoError::from)? {
        out.write_all(&chunk)?;
    }
    out.flush()?;

    Ok(())
}

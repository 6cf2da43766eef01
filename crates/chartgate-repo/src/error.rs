//! Error types for registry operations

use chartgate_core::CoreError;
use thiserror::Error;

/// Registry operation errors
#[derive(Debug, Error)]
pub enum RepoError {
    // ============ Configuration Errors ============
    #[error("Invalid URL: {url} - {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid client configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Cannot load TLS material from {path}: {message}")]
    TlsMaterial { path: String, message: String },

    // ============ Resolution Errors ============
    #[error("no repo named \"{name}\" found")]
    RepositoryNotFound { name: String },

    #[error("Invalid repository file {path}: {message}")]
    InvalidRepositoryFile { path: String, message: String },

    #[error("invalid file url: {url}")]
    InvalidFileUrl { url: String },

    // ============ Network Errors ============
    #[error("Network error: {message}")]
    Transport { message: String },

    /// Non-success response from the registry
    #[error("{status}: {message}")]
    Registry { status: u16, message: String },

    // ============ Index Errors ============
    #[error("Index parse error: {message}")]
    IndexParse { message: String },

    // ============ Dependency Errors ============
    #[error("Dependency update failed: {message}")]
    Dependency { message: String },

    #[error("Version constraint unsatisfiable: {name} requires {constraint}, available: {available}")]
    UnsatisfiableConstraint {
        name: String,
        constraint: String,
        available: String,
    },

    #[error("Integrity check failed for {name}: expected {expected}, got {actual}")]
    IntegrityCheckFailed {
        name: String,
        expected: String,
        actual: String,
    },

    // ============ Chart Errors ============
    #[error(transparent)]
    Chart(#[from] CoreError),

    // ============ IO Errors ============
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RepoError>;

/// Body of a ChartMuseum error response
#[derive(serde::Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
}

impl RepoError {
    /// Build the error for a non-success registry response
    ///
    /// The message comes from the JSON `error` field. When the body is not
    /// JSON, or the field is missing or empty, the raw body is reported.
    pub fn from_response(status: u16, body: &[u8]) -> Self {
        let message = match serde_json::from_slice::<ErrorBody>(body) {
            Ok(parsed) if !parsed.error.is_empty() => parsed.error,
            _ => format!(
                "could not properly parse response JSON: {}",
                String::from_utf8_lossy(body)
            ),
        };
        RepoError::Registry { status, message }
    }

    pub fn dependency(message: impl Into<String>) -> Self {
        RepoError::Dependency {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for RepoError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            RepoError::InvalidConfig {
                message: e.to_string(),
            }
        } else if e.is_connect() {
            RepoError::Transport {
                message: format!("Connection failed: {}", e),
            }
        } else {
            RepoError::Transport {
                message: e.to_string(),
            }
        }
    }
}

impl From<serde_yaml::Error> for RepoError {
    fn from(e: serde_yaml::Error) -> Self {
        RepoError::Serialization(e.to_string())
    }
}

impl From<url::ParseError> for RepoError {
    fn from(e: url::ParseError) -> Self {
        RepoError::InvalidUrl {
            url: String::new(),
            reason: e.to_string(),
        }
    }
}

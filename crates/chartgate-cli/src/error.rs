//! CLI error types with exit code handling
//!
//! Every failure of a push or download lands in one of these categories.
//! Messages are kept verbatim from the layer that produced them, so the
//! registry's own wording reaches the user.

use chartgate_core::CoreError;
use chartgate_repo::RepoError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum CliError {
    /// Bad client settings: URL, TLS material, credentials
    #[error("{message}")]
    #[diagnostic(code(chartgate::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Repository or file URL could not be resolved
    #[error("{message}")]
    #[diagnostic(code(chartgate::cli::resolution))]
    Resolution { message: String },

    /// Dependency update failed
    #[error("{message}")]
    #[diagnostic(code(chartgate::cli::dependency))]
    Dependency { message: String },

    /// Chart could not be loaded or packaged
    #[error("{message}")]
    #[diagnostic(code(chartgate::cli::packaging))]
    Packaging { message: String },

    /// Connection, DNS or TLS failure
    #[error("{message}")]
    #[diagnostic(code(chartgate::cli::transport))]
    Transport { message: String },

    /// Unexpected status from the registry
    #[error("{status}: {message}")]
    #[diagnostic(code(chartgate::cli::registry))]
    Registry { status: u16, message: String },

    /// Malformed index or YAML document
    #[error("{message}")]
    #[diagnostic(code(chartgate::cli::parse))]
    Parse { message: String },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(chartgate::cli::io))]
    Io { message: String },

    /// Wrong number or shape of arguments
    #[error("{message}")]
    #[diagnostic(code(chartgate::cli::usage))]
    Usage {
        message: String,
        #[help]
        help: Option<String>,
    },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        exit_codes::ERROR
    }

    /// Create a usage error with help text
    pub fn usage_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a packaging error
    pub fn packaging(message: impl Into<String>) -> Self {
        Self::Packaging {
            message: message.into(),
        }
    }

    /// Create a dependency error
    pub fn dependency(message: impl Into<String>) -> Self {
        Self::Dependency {
            message: message.into(),
        }
    }

    /// Create an IO error from a message
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }
}

impl From<RepoError> for CliError {
    fn from(err: RepoError) -> Self {
        let message = err.to_string();
        match err {
            RepoError::InvalidUrl { .. } => CliError::Config {
                message,
                help: Some("Repository URLs must start with http://, https:// or cm://".to_string()),
            },
            RepoError::InvalidConfig { .. } | RepoError::TlsMaterial { .. } => {
                CliError::Config { message, help: None }
            }
            RepoError::RepositoryNotFound { .. }
            | RepoError::InvalidRepositoryFile { .. }
            | RepoError::InvalidFileUrl { .. } => CliError::Resolution { message },
            RepoError::Transport { message } => CliError::Transport { message },
            RepoError::Registry { status, message } => CliError::Registry { status, message },
            RepoError::IndexParse { .. } | RepoError::Serialization(_) => {
                CliError::Parse { message }
            }
            RepoError::Dependency { .. }
            | RepoError::UnsatisfiableConstraint { .. }
            | RepoError::IntegrityCheckFailed { .. } => CliError::Dependency { message },
            RepoError::Chart(core) => CliError::from(core),
            RepoError::Io(e) => CliError::from(e),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::YamlParse(e) => CliError::Parse {
                message: e.to_string(),
            },
            CoreError::Io(e) => CliError::from(e),
            other => CliError::Packaging {
                message: other.to_string(),
            },
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_error_keeps_status_and_message() {
        let err = CliError::from(RepoError::from_response(409, br#"{"error":"conflict"}"#));
        assert_eq!(
            err,
            CliError::Registry {
                status: 409,
                message: "conflict".to_string()
            }
        );
        insta::assert_snapshot!(err.to_string(), @"409: conflict");
    }

    #[test]
    fn test_categories() {
        let err = CliError::from(RepoError::RepositoryNotFound {
            name: "museum".to_string(),
        });
        assert!(matches!(err, CliError::Resolution { .. }));
        insta::assert_snapshot!(err.to_string(), @r#"no repo named "museum" found"#);

        let err = CliError::from(RepoError::TlsMaterial {
            path: "/tmp/ca.pem".to_string(),
            message: "No such file or directory".to_string(),
        });
        assert!(matches!(err, CliError::Config { .. }));

        let err = CliError::from(RepoError::IndexParse {
            message: "bad".to_string(),
        });
        assert!(matches!(err, CliError::Parse { .. }));

        let err = CliError::from(RepoError::Chart(CoreError::ChartNotFound {
            path: "missing".to_string(),
        }));
        assert!(matches!(err, CliError::Packaging { .. }));

        assert_eq!(err.exit_code(), exit_codes::ERROR);
    }
}

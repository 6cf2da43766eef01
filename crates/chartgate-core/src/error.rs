//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Chart not found: {path}")]
    ChartNotFound { path: String },

    #[error("Invalid chart directory {path}: {message}")]
    InvalidChartDir { path: String, message: String },

    #[error("Invalid Chart.yaml: {message}")]
    InvalidChart { message: String },

    #[error("Failed to parse Chart.yaml: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {message}")]
    Archive { message: String },

    #[error("Invalid .helmignore pattern '{pattern}': {message}")]
    IgnorePattern { pattern: String, message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;

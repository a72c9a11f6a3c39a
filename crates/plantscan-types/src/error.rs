//! Error types for plantscan
//!
//! Only configuration and programmer faults live here. Provider and
//! parsing failures never surface as `Error`; they are folded into a
//! `PlantAssessment` or a chat reply by the vision layer.

use thiserror::Error;

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration not found")]
    NotFound,

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Failed to save configuration: {0}")]
    SaveError(String),

    #[error("Missing provider setting: {0} (set it in config.toml or via environment)")]
    MissingCredential(&'static str),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid model call: {0}")]
    InvalidCallSpec(String),

    #[error("HTTP client setup failed: {0}")]
    Client(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid image format: {0}")]
    InvalidImageFormat(String),
}

pub type Result<T> = std::result::Result<T, Error>;

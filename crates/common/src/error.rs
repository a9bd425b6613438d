//! Error types for miqnav

use thiserror::Error;

/// Result type alias using the common Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by configuration, logging and polling helpers
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid version string: {0}")]
    InvalidVersion(String),

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Timed out after {seconds:.1}s waiting for {message}")]
    Timeout { message: String, seconds: f64 },

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

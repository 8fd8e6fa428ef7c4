//! Error types for fable

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for fable operations
#[derive(Debug, Error)]
pub enum FableError {
    /// Generation service unreachable, timed out, or answered non-2xx
    #[error("Generation service unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Expected field absent across every known alias
    #[error("Malformed generation response: {0}")]
    MalformedResponse(String),

    #[error("Asset file not found: {}", .0.display())]
    AssetNotFound(PathBuf),

    #[error("Unsafe asset path rejected: {}", .0.display())]
    UnsafePath(PathBuf),

    #[error("Object storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Object storage upload failed: {0}")]
    StorageUploadFailed(String),

    /// Post-write verification detected that a field was lost
    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(String),

    #[error("TOML serialization error: {0}")]
    TomlSerError(String),

    #[error("JSON error: {0}")]
    JsonError(String),
}

/// Result type alias for fable operations
pub type Result<T> = std::result::Result<T, FableError>;

impl From<toml::de::Error> for FableError {
    fn from(err: toml::de::Error) -> Self {
        FableError::TomlParseError(err.to_string())
    }
}

impl From<toml::ser::Error> for FableError {
    fn from(err: toml::ser::Error) -> Self {
        FableError::TomlSerError(err.to_string())
    }
}

impl From<serde_json::Error> for FableError {
    fn from(err: serde_json::Error) -> Self {
        FableError::JsonError(err.to_string())
    }
}

//! # Error Types
//!
//! Custom error types for the irradiance node using `thiserror`.

use thiserror::Error;

/// Main error type for the irradiance node
#[derive(Debug, Error)]
pub enum NodeError {
    /// Radio frame construction errors
    #[error("Radio frame error: {0}")]
    Frame(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Accumulator thresholds out of order
    #[error("Invalid thresholds: {0}")]
    InvalidThresholds(String),

    /// Serial modem errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// No radio modem found at any of the candidate paths
    #[error("No radio modem found (tried: {0})")]
    RadioPortNotFound(String),

    /// HTTP upload errors
    #[error("Upload error: {0}")]
    Upload(String),

    /// Snapshot log serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the irradiance node
pub type Result<T> = std::result::Result<T, NodeError>;

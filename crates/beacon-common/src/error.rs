//! Error types for Project Beacon.

use thiserror::Error;

/// Top-level error type for Beacon operations.
#[derive(Debug, Error)]
pub enum BeaconError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Beacon operations.
pub type BeaconResult<T> = Result<T, BeaconError>;

//! Error types for Ratefold.

use thiserror::Error;

/// Main error type for Ratefold operations.
#[derive(Error, Debug)]
pub enum RateFoldError {
    /// An event was recorded for a scope that has no restriction registered
    #[error("No restriction configured for scope '{0}'")]
    UnconfiguredScope(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Ratefold operations.
pub type Result<T> = std::result::Result<T, RateFoldError>;

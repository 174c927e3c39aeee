//! Error types for the Ratewall service.

use thiserror::Error;

/// Main error type for Ratewall operations.
#[derive(Error, Debug)]
pub enum RatewallError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A policy name that is not part of the registry
    #[error("Unknown rate limit policy: {0}")]
    UnknownPolicy(String),

    /// Counter store errors (malformed replies, rejected commands)
    #[error("Store error: {0}")]
    Store(String),

    /// Transport errors talking to the remote store
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for RatewallError {
    fn from(err: config::ConfigError) -> Self {
        RatewallError::Config(err.to_string())
    }
}

/// Result type alias for Ratewall operations.
pub type Result<T> = std::result::Result<T, RatewallError>;

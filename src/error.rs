//! Error types for tinytld.

use thiserror::Error;

/// Errors that can occur in the name service.
#[derive(Debug, Error)]
pub enum TldError {
    /// IO error (network, file, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Hosts file encode/decode error
    #[error("Hosts file codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Domain suffixes that break the registration/lookup layout
    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    /// A listener stopped serving
    #[error("{0} server stopped: {1}")]
    Serve(&'static str, String),
}

impl From<config::ConfigError> for TldError {
    fn from(err: config::ConfigError) -> Self {
        TldError::Config(err.to_string())
    }
}

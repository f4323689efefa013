//! Error types for the edge authentication gate

use std::io;

use thiserror::Error;

/// Result type alias for the gate
pub type Result<T> = std::result::Result<T, Error>;

/// Gate errors
///
/// Per-request failures never surface as this type at the handler
/// boundary: the request gate converts them into a definite response.
/// Only startup paths (configuration, binding) propagate it to `main`.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Upstream collaborator (secret store, identity provider, origin) failed
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// IO error (binding the listener)
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

//! Error types for warden-cli

use thiserror::Error;

/// Result type alias for warden-cli operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in warden-cli
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Error from the engine or its storage
    #[error(transparent)]
    Core(#[from] warden_core::Error),

    /// Error from the introspection server
    #[error(transparent)]
    Api(#[from] warden_api::Error),

    /// `--params` was not a JSON object.
    #[error("invalid --params: {0}")]
    InvalidParams(String),
}

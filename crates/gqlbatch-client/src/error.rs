//! Errors raised while constructing a client.

use thiserror::Error;

use crate::config::ConfigLoadError;

/// Failure to build a [`BatchedClient`](crate::BatchedClient) or its transport.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The endpoint URL could not be parsed.
    #[error("invalid endpoint url '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    /// A configured header name or value is not valid HTTP.
    #[error("invalid header '{name}': {message}")]
    InvalidHeader { name: String, message: String },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Config(#[from] ConfigLoadError),
}

/// Result type for client construction.
pub type BuildResult<T> = Result<T, BuildError>;

//! Server Error Types

use thiserror::Error;

/// Errors raised while starting or running the HTTP server
#[derive(Error, Debug)]
pub enum ApiError {
    /// The listen address could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Server loop failed
    #[error("Server error: {0}")]
    Serve(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for server operations
pub type ApiResult<T> = Result<T, ApiError>;

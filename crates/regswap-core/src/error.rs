//! Error types for regswap.
//!
//! Every failure here is terminal for the current invocation. The coordinator
//! turns them into a `success: false` result; they never escape `run`.

use crate::accessor::Backend;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the regswap library.
#[derive(Debug, Error)]
pub enum RegswapError {
    // Package manager configuration errors
    #[error("Failed to read {backend} registry: {message}")]
    ConfigRead { backend: Backend, message: String },

    #[error("Failed to write {backend} registry: {message}")]
    ConfigWrite { backend: Backend, message: String },

    // Child process errors
    #[error("Failed to spawn {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("Registry server exited with status {code}")]
    AbnormalExit { code: i32 },

    #[error("Registry server stopped by {signal}")]
    Terminated { signal: String },

    #[error("Signal handling failed: {message}")]
    Signal { message: String },

    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },
}

/// Result type alias for regswap operations.
pub type Result<T> = std::result::Result<T, RegswapError>;

impl From<std::io::Error> for RegswapError {
    fn from(err: std::io::Error) -> Self {
        RegswapError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for RegswapError {
    fn from(err: serde_json::Error) -> Self {
        RegswapError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl RegswapError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        RegswapError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }
}

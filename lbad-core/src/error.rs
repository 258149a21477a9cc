//! Error types for lbad

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for lbad operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Malformed point: {0}")]
    MalformedPoint(String),

    #[error("Failed to load models from {}: {reason}", path.display())]
    ModelLoad { path: PathBuf, reason: String },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Worker error: {0}")]
    Worker(String),
}

impl Error {
    /// Build a [`Error::ModelLoad`] for `path`
    pub fn model_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::ModelLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for lbad operations
pub type Result<T> = std::result::Result<T, Error>;

//! Error types for record storage.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading or writing record sets.
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error during file operations.
    #[error("I/O error at {path}: {source}")]
    FileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed delimited content.
    #[error("malformed records at {path}: {message}")]
    Malformed { path: PathBuf, message: String },

    /// Record carries a column the existing header does not have.
    #[error("column '{column}' is not in the header of {path}")]
    UnknownColumn { path: PathBuf, column: String },

    /// Record set not found.
    #[error("record set not found: {0}")]
    NotFound(String),
}

impl StorageError {
    /// Create a file I/O error with path context.
    pub fn file_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileIo {
            path: path.into(),
            source,
        }
    }

    /// Create a malformed-content error with path context.
    pub fn malformed(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Malformed {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

/// Convenience type alias for storage results.
pub type StorageResult<T> = Result<T, StorageError>;

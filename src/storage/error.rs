//! Error types for the checkpoint store

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::error::{ErrorCode, StagehandError};

/// Result type for store operations
pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    /// Reading, writing or locking a file failed
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The status document could not be encoded or decoded
    #[error("Serialization error: {message}")]
    Serialization {
        path: Option<PathBuf>,
        message: String,
    },

    /// Lock acquisition failed
    #[error("Lock error: {0}")]
    Lock(String),

    /// Empty or reserved field key, or an identity missing a required part
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

impl StorageError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create a serialization error not tied to a file
    pub fn serialization<E: fmt::Display>(err: E) -> Self {
        Self::Serialization {
            path: None,
            message: err.to_string(),
        }
    }

    /// Create a deserialization error for a specific document
    pub fn corrupted<E: fmt::Display>(path: impl AsRef<Path>, err: E) -> Self {
        Self::Serialization {
            path: Some(path.as_ref().to_path_buf()),
            message: err.to_string(),
        }
    }

    pub fn lock<E: fmt::Display>(msg: E) -> Self {
        Self::Lock(msg.to_string())
    }

    pub fn invalid_key<E: fmt::Display>(msg: E) -> Self {
        Self::InvalidKey(msg.to_string())
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Io { path, .. } => Some(path),
            Self::Serialization { path, .. } => path.as_deref(),
            _ => None,
        }
    }

    fn code(&self) -> u16 {
        match self {
            Self::Io { source, .. } if source.kind() == std::io::ErrorKind::PermissionDenied => {
                ErrorCode::STORAGE_PERMISSION_DENIED
            }
            Self::Io { .. } => ErrorCode::STORAGE_IO_ERROR,
            Self::Serialization { path: Some(_), .. } => ErrorCode::STORAGE_CORRUPTED,
            Self::Serialization { .. } => ErrorCode::STORAGE_SERIALIZATION_ERROR,
            Self::Lock(_) => ErrorCode::STORAGE_LOCK_FAILED,
            Self::InvalidKey(_) => ErrorCode::STORAGE_INVALID_KEY,
        }
    }
}

impl From<StorageError> for StagehandError {
    fn from(err: StorageError) -> Self {
        let code = err.code();
        let path = err.path().map(Path::to_path_buf);
        let message = err.to_string();
        StagehandError::storage_with_code(code, message, path).with_source(err)
    }
}

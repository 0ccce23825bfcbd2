//! Error types for StoreCopy
//!
//! This module defines the error taxonomy used by the storage backends and
//! the copy engine. Enumeration and open failures are only ever logged;
//! write failures are returned from `put_file` and either discarded or
//! promoted to an abort by the engine.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for StoreCopy operations
#[derive(Error, Debug)]
pub enum StoreCopyError {
    /// I/O error during local file operations
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A path or key that cannot be written safely
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// The source could not be walked or listed
    #[error("Could not enumerate {location}: {message}")]
    Enumeration { location: String, message: String },

    /// The content stream of a single item could not be opened
    #[error("Could not open {path}: {message}")]
    Open { path: String, message: String },

    /// Remote request failed
    #[error("Remote transfer error: {0}")]
    RemoteTransferError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A write failed while running in fail-fast mode
    #[error("Copy aborted at '{path}': {source}")]
    Aborted {
        path: String,
        #[source]
        source: Box<StoreCopyError>,
    },

    /// A worker task panicked or was cancelled
    #[error("Worker error: {0}")]
    WorkerError(String),
}

impl StoreCopyError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an enumeration error
    pub fn enumeration(location: impl Into<String>, message: impl ToString) -> Self {
        Self::Enumeration {
            location: location.into(),
            message: message.to_string(),
        }
    }

    /// Create an open error
    pub fn open(path: impl Into<String>, message: impl ToString) -> Self {
        Self::Open {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create a remote transfer error
    pub fn remote(message: impl Into<String>) -> Self {
        Self::RemoteTransferError(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Wrap a write failure that terminates the run
    pub fn aborted(path: impl Into<String>, source: StoreCopyError) -> Self {
        Self::Aborted {
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// Check if this error was raised before any copying could start
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigError(_))
    }

    /// Check if this error ended a fail-fast run
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}

/// Result type alias for StoreCopy operations
pub type Result<T> = std::result::Result<T, StoreCopyError>;

impl From<std::io::Error> for StoreCopyError {
    fn from(err: std::io::Error) -> Self {
        StoreCopyError::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<reqwest::Error> for StoreCopyError {
    fn from(err: reqwest::Error) -> Self {
        StoreCopyError::RemoteTransferError(err.to_string())
    }
}

impl From<serde_json::Error> for StoreCopyError {
    fn from(err: serde_json::Error) -> Self {
        StoreCopyError::RemoteTransferError(format!("Malformed response: {}", err))
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| StoreCopyError::io(path, e))
    }
}

//! Error types for Chronicle
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Conflicts are the only recoverable class: callers re-read and retry.
//! Missing streams and documents are never errors, they surface as empty
//! results.

use std::io;
use thiserror::Error;

/// Result type alias for Chronicle operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the Chronicle store
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file operations, fsync, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error
    ///
    /// Also raised when a stored payload cannot be decoded; reads fail
    /// instead of skipping the record.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Optimistic concurrency conflict on a stream offset or snapshot version
    ///
    /// `actual` is the value the store would have accepted.
    #[error("Concurrency conflict on {entity}: expected {expected}, actual {actual}")]
    Conflict {
        /// Stream name or document id the write targeted
        entity: String,
        /// Offset or version supplied by the caller
        expected: u64,
        /// Offset or version the store would have accepted
        actual: u64,
    },

    /// Invalid argument supplied by the caller
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Data corruption detected (WAL checksum, broken stream contiguity)
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Storage layer error
    #[error("Storage error: {0}")]
    Storage(String),

    /// The database has been shut down
    #[error("Database is closed")]
    Closed,
}

impl Error {
    /// Build a conflict error
    pub fn conflict(entity: impl Into<String>, expected: u64, actual: u64) -> Self {
        Error::Conflict {
            entity: entity.into(),
            expected,
            actual,
        }
    }

    /// Build an invalid-input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Build a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Error::Serialization(msg.into())
    }

    /// Build a corruption error
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Build a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }

    /// Whether the caller may re-read and retry
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

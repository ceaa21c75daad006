//! Error types for mining data streams

use std::fmt::Display;
use std::io;
use thiserror::Error;

/// Result type for mining stream operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for mining stream operations
#[derive(Error, Debug)]
pub enum Error {
    /// The origin of a source (file, directory, connection) cannot be opened
    #[error("Source unavailable: {origin}: {reason}")]
    SourceUnavailable {
        /// Path, directory or connection string of the source
        origin: String,
        /// Underlying cause
        reason: String,
    },

    /// I/O or decoding failure while reading a record
    #[error("Read error in {origin}: {reason}")]
    SourceRead {
        /// Path, directory or connection string of the source
        origin: String,
        /// Underlying cause
        reason: String,
    },

    /// Composed sources disagree on their attribute layout
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Vertically composed members report different record counts
    #[error("Row count mismatch: member {member} has {found} records, expected {expected}")]
    RowCountMismatch {
        /// Position of the offending member
        member: usize,
        /// Record count of the first member
        expected: usize,
        /// Record count of the offending member
        found: usize,
    },

    /// Schema recognition could not complete
    #[error("Schema recognition failed: {0}")]
    Recognition(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid operation for the current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// IO error outside of a record source
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Settings could not be deserialized
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

impl Error {
    /// Build a [`Error::SourceUnavailable`] from any displayable cause
    pub fn unavailable(origin: impl Into<String>, reason: impl Display) -> Self {
        Error::SourceUnavailable {
            origin: origin.into(),
            reason: reason.to_string(),
        }
    }

    /// Build a [`Error::SourceRead`] from any displayable cause
    pub fn read(origin: impl Into<String>, reason: impl Display) -> Self {
        Error::SourceRead {
            origin: origin.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the caller may retry or skip past this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::SourceRead { .. })
    }
}

//! Error types for tourney-core

use thiserror::Error;

/// Result type alias using tourney-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in publication store operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Tournament not found
    #[error("Tournament not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Optimistic concurrency check failed; the stored row was left untouched
    #[error("Version conflict on tournament {id}: expected version {expected}, found {actual}")]
    Conflict {
        id: String,
        expected: i64,
        actual: i64,
    },

    /// Another tournament already holds the cross-reference id
    #[error("Cross-reference id {0} is already linked to another tournament")]
    DuplicateCrossRef(String),

    /// Write attempted by the side that does not own the record
    #[error("Ownership violation: {0}")]
    OwnershipViolation(String),
}

impl Error {
    /// Whether the error is an optimistic concurrency conflict
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

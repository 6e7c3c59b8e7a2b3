//! Error taxonomy for the synchronization engine

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification attached to every failure in logs and run summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Mapping,
    NotFound,
    RateLimited,
    RemoteFault,
    Unreachable,
    Timeout,
    Rejected,
    InvalidPayload,
    InvalidConfiguration,
    Conflict,
    OwnershipViolation,
    InvalidInput,
    Store,
    ConfirmationFailed,
    AlreadyRunning,
    Disabled,
    InvalidInterval,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mapping => "mapping",
            Self::NotFound => "not_found",
            Self::RateLimited => "rate_limited",
            Self::RemoteFault => "remote_fault",
            Self::Unreachable => "unreachable",
            Self::Timeout => "timeout",
            Self::Rejected => "rejected",
            Self::InvalidPayload => "invalid_payload",
            Self::InvalidConfiguration => "invalid_configuration",
            Self::Conflict => "conflict",
            Self::OwnershipViolation => "ownership_violation",
            Self::InvalidInput => "invalid_input",
            Self::Store => "store",
            Self::ConfirmationFailed => "confirmation_failed",
            Self::AlreadyRunning => "already_running",
            Self::Disabled => "disabled",
            Self::InvalidInterval => "invalid_interval",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure of a submission portal call.
///
/// The portal client never retries; callers decide based on the variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Submission portal resource not found: {0}")]
    NotFound(String),
    #[error("Submission portal rate limited the request")]
    RateLimited { retry_after: Option<Duration> },
    #[error("Submission portal fault: {message} ({status})")]
    RemoteFault { status: u16, message: String },
    #[error("Submission portal unreachable: {0}")]
    Unreachable(String),
    #[error("Submission portal request timed out")]
    Timeout,
    #[error("Submission portal rejected the request: {message} ({status})")]
    Rejected { status: u16, message: String },
    #[error("Invalid submission portal payload: {0}")]
    InvalidPayload(String),
    #[error("Invalid submission portal configuration: {0}")]
    InvalidConfiguration(String),
}

impl TransportError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::RemoteFault { .. } => ErrorKind::RemoteFault,
            Self::Unreachable(_) => ErrorKind::Unreachable,
            Self::Timeout => ErrorKind::Timeout,
            Self::Rejected { .. } => ErrorKind::Rejected,
            Self::InvalidPayload(_) => ErrorKind::InvalidPayload,
            Self::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
        }
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// An upstream record the field mapper cannot translate
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("Submission record is missing {0}")]
    MissingField(&'static str),
    #[error("Submission record has malformed {field}: {value}")]
    Malformed { field: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Store(#[from] crate::Error),

    /// `target` is the cross-reference id, or the name for unlinked rows
    #[error("Could not confirm removal of {target}: {source}")]
    ConfirmationFailed {
        target: String,
        source: TransportError,
    },

    #[error("A synchronization run is already in progress")]
    AlreadyRunning,

    #[error("Synchronization is disabled")]
    Disabled,

    #[error("Synchronization run exceeded its {budget_secs}s budget")]
    BudgetExceeded { budget_secs: u64 },

    #[error("Sync interval must be between {min} and {max} minutes, got {requested}")]
    InvalidInterval { requested: u64, min: u64, max: u64 },
}

impl SyncError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Mapping(_) => ErrorKind::Mapping,
            Self::Transport(error) => error.kind(),
            Self::Store(error) => match error {
                crate::Error::Conflict { .. } | crate::Error::DuplicateCrossRef(_) => {
                    ErrorKind::Conflict
                }
                crate::Error::NotFound(_) => ErrorKind::NotFound,
                crate::Error::OwnershipViolation(_) => ErrorKind::OwnershipViolation,
                crate::Error::InvalidInput(_) => ErrorKind::InvalidInput,
                _ => ErrorKind::Store,
            },
            Self::ConfirmationFailed { .. } => ErrorKind::ConfirmationFailed,
            Self::AlreadyRunning => ErrorKind::AlreadyRunning,
            Self::Disabled => ErrorKind::Disabled,
            Self::BudgetExceeded { .. } => ErrorKind::Timeout,
            Self::InvalidInterval { .. } => ErrorKind::InvalidInterval,
        }
    }

    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(error) if error.is_conflict())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_are_classified() {
        let conflict = SyncError::from(crate::Error::Conflict {
            id: "t-1".to_string(),
            expected: 1,
            actual: 2,
        });
        assert_eq!(conflict.kind(), ErrorKind::Conflict);
        assert!(conflict.is_conflict());

        let missing = SyncError::from(crate::Error::NotFound("t-1".to_string()));
        assert_eq!(missing.kind(), ErrorKind::NotFound);
        assert!(!missing.is_conflict());
    }

    #[test]
    fn transport_kind_passes_through() {
        let error = SyncError::from(TransportError::RateLimited {
            retry_after: Some(Duration::from_secs(30)),
        });
        assert_eq!(error.kind(), ErrorKind::RateLimited);
        assert_eq!(error.kind().to_string(), "rate_limited");
    }
}

use std::io;

use thiserror::Error;
use tourney_core::config::ConfigError;
use tourney_core::sync::{SyncError, TransportError};

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] tourney_core::Error),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid tournament ID: {0}")]
    InvalidTournamentId(String),
    #[error("Tournament not found: {0}")]
    TournamentNotFound(String),
    #[error(
        "Sync is disabled. Set SYNC_ENABLED=true and SUBMISSION_PORTAL_URL to use this command."
    )]
    SyncDisabled,
}

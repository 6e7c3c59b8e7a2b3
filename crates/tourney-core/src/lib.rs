//! tourney-core - Core library for tourney-sync
//!
//! This crate contains the tournament models, the publication store, and the
//! engine that keeps it in step with the submission portal. Used by both the
//! API service and the operator CLI.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Ownership, Tournament, TournamentFields, TournamentId};

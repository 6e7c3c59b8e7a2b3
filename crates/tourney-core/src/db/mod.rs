//! Database layer for the publication store

mod connection;
mod migrations;
mod repository;

pub use connection::Database;
pub use repository::{LibSqlTournamentRepository, TournamentRepository};

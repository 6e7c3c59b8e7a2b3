use std::env;
use std::path::{Path, PathBuf};

use chrono::DateTime;
use tourney_core::config::{EngineConfig, DATABASE_PATH_VAR, DEFAULT_DATABASE_PATH};
use tourney_core::models::SyncRunRecord;
use tourney_core::services::PublicationStore;
use tourney_core::sync::{SyncEngine, SyncSummary};
use tourney_core::{Ownership, Tournament, TournamentId};

use crate::error::CliError;

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os(DATABASE_PATH_VAR).map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tourney")
        .join(DEFAULT_DATABASE_PATH)
}

pub async fn open_store(path: &Path) -> Result<PublicationStore, CliError> {
    Ok(PublicationStore::open_path(path.to_path_buf()).await?)
}

pub fn open_engine(store: PublicationStore, config: &EngineConfig) -> Result<SyncEngine, CliError> {
    SyncEngine::from_config(store, config)?.ok_or(CliError::SyncDisabled)
}

pub fn parse_tournament_id(raw: &str) -> Result<TournamentId, CliError> {
    raw.trim()
        .parse()
        .map_err(|_| CliError::InvalidTournamentId(raw.to_string()))
}

pub async fn require_tournament(
    store: &PublicationStore,
    id: &TournamentId,
) -> Result<Tournament, CliError> {
    store
        .get(id)
        .await?
        .ok_or_else(|| CliError::TournamentNotFound(id.to_string()))
}

pub fn format_tournament_lines(tournaments: &[Tournament]) -> Vec<String> {
    tournaments
        .iter()
        .map(|tournament| {
            let ownership = tournament.ownership.map_or("legacy", Ownership::as_str);
            let cross_ref = tournament
                .cross_ref_id
                .as_ref()
                .map_or("-", |id| id.as_str());
            format!(
                "{}  {}  {:<16}  {:<10}  v{:<3}  {}",
                tournament.id,
                tournament.fields.start_date,
                ownership,
                cross_ref,
                tournament.version,
                tournament.fields.name
            )
        })
        .collect()
}

pub fn format_summary(summary: &SyncSummary) -> Vec<String> {
    let mut lines = vec![format!(
        "Pull {}: {} created, {} updated, {} linked, {} skipped, {} deleted, {} errors",
        summary.outcome.as_str(),
        summary.created,
        summary.updated,
        summary.linked,
        summary.skipped,
        summary.deleted,
        summary.errors.len()
    )];
    lines.extend(summary.errors.iter().map(|failure| {
        format!(
            "  ! {:?} {} {}: {}",
            failure.operation,
            failure
                .application_id
                .as_deref()
                .or(failure.tournament_id.as_deref())
                .unwrap_or("-"),
            failure.kind,
            failure.message
        )
    }));
    lines
}

pub fn format_run_lines(runs: &[SyncRunRecord]) -> Vec<String> {
    runs.iter()
        .map(|run| {
            format!(
                "#{:<4} {}  {:<9}  created={} updated={} linked={} skipped={} deleted={} errors={}",
                run.id,
                format_timestamp(run.started_at),
                run.outcome,
                run.created,
                run.updated,
                run.linked,
                run.skipped,
                run.deleted,
                run.error_count
            )
        })
        .collect()
}

pub fn format_timestamp(unix_ms: i64) -> String {
    DateTime::from_timestamp_millis(unix_ms).map_or_else(
        || unix_ms.to_string(),
        |timestamp| timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
    )
}

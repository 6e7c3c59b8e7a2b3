use std::path::PathBuf;
use std::sync::Arc;

use clap_complete::Shell;
use pretty_assertions::assert_eq;
use tempfile::tempdir;
use tourney_core::config::EngineConfig;
use tourney_core::models::SyncRunRecord;
use tourney_core::services::PublicationStore;
use tourney_core::sync::testing::{submission, FakePortal};
use tourney_core::sync::{ErrorKind, PushOutcome, SyncEngine, SyncSummary};
use tourney_core::{Ownership, TournamentFields};

use crate::commands::common::{
    format_run_lines, format_summary, format_timestamp, format_tournament_lines, open_engine,
    open_store, parse_tournament_id, require_tournament, resolve_db_path,
};
use crate::commands::completions::{completion_script, run_completions};
use crate::commands::portal::portal_report;
use crate::commands::pull::run_pull;
use crate::commands::push::{describe_push, run_claim, run_delete, run_push};
use crate::error::CliError;

async fn engine_with(portal: FakePortal) -> (tempfile::TempDir, PublicationStore, SyncEngine) {
    let dir = tempdir().unwrap();
    let store = open_store(&dir.path().join("tourney.db")).await.unwrap();
    let engine = SyncEngine::new(store.clone(), Arc::new(portal), &EngineConfig::disabled());
    (dir, store, engine)
}

fn fields(name: &str, start: &str) -> TournamentFields {
    TournamentFields::new(name, start.parse().unwrap())
}

#[test]
fn resolve_db_path_prefers_flag() {
    let explicit = PathBuf::from("/tmp/elsewhere/tourney.db");
    assert_eq!(resolve_db_path(Some(explicit.clone())), explicit);
}

#[test]
fn parse_tournament_id_rejects_garbage() {
    let error = parse_tournament_id("not-a-uuid").unwrap_err();
    assert!(matches!(error, CliError::InvalidTournamentId(raw) if raw == "not-a-uuid"));
}

#[tokio::test]
async fn open_engine_requires_enabled_sync() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir.path().join("nested/tourney.db")).await.unwrap();
    let error = open_engine(store, &EngineConfig::disabled()).unwrap_err();
    assert!(matches!(error, CliError::SyncDisabled));
}

#[test]
fn format_timestamp_renders_utc() {
    assert_eq!(format_timestamp(0), "1970-01-01 00:00:00");
    assert_eq!(format_timestamp(1_740_787_200_000), "2025-03-01 00:00:00");
}

#[test]
fn format_summary_reports_counts() {
    let mut summary = SyncSummary::start();
    summary.created = 2;
    summary.skipped = 1;
    let mut lines = format_summary(&summary);
    assert_eq!(lines.len(), 1);
    assert_eq!(
        lines.remove(0),
        "Pull completed: 2 created, 0 updated, 0 linked, 1 skipped, 0 deleted, 0 errors"
    );
}

#[test]
fn format_run_lines_shows_counts() {
    let run = SyncRunRecord {
        id: 7,
        started_at: 0,
        finished_at: 1_000,
        outcome: "aborted".to_string(),
        created: 0,
        updated: 0,
        linked: 0,
        skipped: 0,
        deleted: 0,
        error_count: 1,
        errors_json: "[]".to_string(),
    };
    let lines = format_run_lines(&[run]);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("#7"));
    assert!(lines[0].contains("aborted"));
    assert!(lines[0].contains("errors=1"));
}

#[tokio::test(flavor = "multi_thread")]
async fn pull_mirrors_approved_records() {
    let portal = FakePortal::new();
    portal.put(submission("A1", "KL Open", "2025-05-10", "approved"));
    portal.put(submission("A2", "Penang Rapid", "2025-06-01", "pending"));
    let (_dir, store, engine) = engine_with(portal).await;

    run_pull(&engine, false).await.unwrap();

    let tournaments = store.list(10, 0).await.unwrap();
    assert_eq!(tournaments.len(), 1);
    assert_eq!(tournaments[0].fields.name, "KL Open");
    assert_eq!(tournaments[0].ownership, Some(Ownership::SubmissionOwned));

    let lines = format_tournament_lines(&tournaments);
    assert!(lines[0].contains("submission-owned"));
    assert!(lines[0].contains("A1"));
    assert_eq!(store.list_sync_runs(5).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn claim_turns_mirrored_row_local() {
    let portal = FakePortal::new();
    portal.put(submission("A1", "KL Open", "2025-05-10", "approved"));
    let (_dir, store, engine) = engine_with(portal).await;
    run_pull(&engine, false).await.unwrap();
    let mirrored = store.list(1, 0).await.unwrap().remove(0);

    run_claim(&store, &engine, &mirrored.id.to_string())
        .await
        .unwrap();

    let claimed = store.get(&mirrored.id).await.unwrap().unwrap();
    assert_eq!(claimed.ownership, Some(Ownership::Local));
    assert_eq!(claimed.version, mirrored.version + 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_refuses_mirrored_rows() {
    let portal = FakePortal::new();
    portal.put(submission("A1", "KL Open", "2025-05-10", "approved"));
    let (_dir, store, engine) = engine_with(portal).await;
    run_pull(&engine, false).await.unwrap();
    let mirrored = store.list(1, 0).await.unwrap().remove(0);

    let error = run_delete(&store, &engine, &mirrored.id.to_string())
        .await
        .unwrap_err();
    match error {
        CliError::Sync(sync) => assert_eq!(sync.kind(), ErrorKind::OwnershipViolation),
        other => panic!("unexpected error: {other}"),
    }
    assert!(store.get(&mirrored.id).await.unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn push_then_delete_local_row() {
    let (_dir, store, engine) = engine_with(FakePortal::with_next_id(3)).await;
    let local = store
        .create_local(&fields("Shah Alam Cup", "2025-03-01"))
        .await
        .unwrap();

    run_push(&engine, &local.id.to_string()).await.unwrap();
    let pushed = require_tournament(&store, &local.id).await.unwrap();
    assert_eq!(pushed.cross_ref_id.as_ref().map(|id| id.as_str()), Some("A3"));

    run_claim(&store, &engine, &local.id.to_string())
        .await
        .unwrap();
    run_delete(&store, &engine, &local.id.to_string())
        .await
        .unwrap();

    let missing = require_tournament(&store, &local.id).await.unwrap_err();
    assert!(matches!(missing, CliError::TournamentNotFound(_)));
}

#[tokio::test]
async fn portal_report_collects_health() {
    let (_dir, _store, engine) = engine_with(FakePortal::new()).await;
    let report = portal_report(&engine).await.unwrap();
    assert!(report.healthy);
    assert!(report.error.is_none());
}

#[test]
fn describe_push_mentions_skip_reason() {
    let text = describe_push(&PushOutcome::Skipped {
        reason: "not_local",
    });
    assert_eq!(text, "Skipped: not_local");
}

#[test]
fn completions_write_to_nested_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("completions/tourney.bash");
    run_completions(Shell::Bash, Some(&path)).unwrap();
    let script = std::fs::read_to_string(&path).unwrap();
    assert!(script.contains("tourney"));
}

#[test]
fn zsh_completions_register_binary_name() {
    let script = String::from_utf8(completion_script(Shell::Zsh)).unwrap();
    assert!(script.starts_with("#compdef tourney"));
    assert!(script.contains("claim"));
}

use tourney_core::services::PublicationStore;
use tourney_core::sync::{PushOutcome, SyncEngine};

use crate::commands::common::{parse_tournament_id, require_tournament};
use crate::error::CliError;

pub async fn run_push(engine: &SyncEngine, raw_id: &str) -> Result<(), CliError> {
    let id = parse_tournament_id(raw_id)?;
    let outcome = engine.push().push(&id).await?;
    println!("{}", describe_push(&outcome));
    Ok(())
}

pub async fn run_claim(
    store: &PublicationStore,
    engine: &SyncEngine,
    raw_id: &str,
) -> Result<(), CliError> {
    let id = parse_tournament_id(raw_id)?;
    let current = require_tournament(store, &id).await?;
    let claimed = engine.push().claim(&id, current.version).await?;
    println!(
        "Claimed {} ({}), now at version {}",
        claimed.id, claimed.fields.name, claimed.version
    );
    Ok(())
}

pub async fn run_delete(
    store: &PublicationStore,
    engine: &SyncEngine,
    raw_id: &str,
) -> Result<(), CliError> {
    let id = parse_tournament_id(raw_id)?;
    let current = require_tournament(store, &id).await?;
    engine.push().delete_local(&id, current.version).await?;
    println!("Deleted {} ({})", current.id, current.fields.name);
    Ok(())
}

pub fn describe_push(outcome: &PushOutcome) -> String {
    match outcome {
        PushOutcome::Created { tournament } => format!(
            "Created upstream application {} for {}",
            tournament
                .cross_ref_id
                .as_ref()
                .map_or("-", |id| id.as_str()),
            tournament.fields.name
        ),
        PushOutcome::Updated { tournament } => {
            format!("Updated upstream copy of {}", tournament.fields.name)
        }
        PushOutcome::Skipped { reason } => format!("Skipped: {reason}"),
        PushOutcome::RemovedUpstreamMissing => {
            "Upstream application no longer exists; local row removed".to_string()
        }
    }
}

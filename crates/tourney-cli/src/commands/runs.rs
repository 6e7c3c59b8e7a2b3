use tourney_core::services::PublicationStore;

use crate::commands::common::format_run_lines;
use crate::error::CliError;

pub async fn run_runs(store: &PublicationStore, limit: usize, as_json: bool) -> Result<(), CliError> {
    let runs = store.list_sync_runs(limit).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
    } else if runs.is_empty() {
        println!("No sync runs recorded");
    } else {
        for line in format_run_lines(&runs) {
            println!("{line}");
        }
    }

    Ok(())
}

use tourney_core::services::PublicationStore;

use crate::commands::common::format_tournament_lines;
use crate::error::CliError;

pub async fn run_list(store: &PublicationStore, limit: usize, as_json: bool) -> Result<(), CliError> {
    let tournaments = store.list(limit, 0).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&tournaments)?);
    } else if tournaments.is_empty() {
        println!("No tournaments");
    } else {
        for line in format_tournament_lines(&tournaments) {
            println!("{line}");
        }
    }

    Ok(())
}

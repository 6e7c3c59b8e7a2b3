use tourney_core::sync::SyncEngine;

use crate::commands::common::format_summary;
use crate::error::CliError;

pub async fn run_pull(engine: &SyncEngine, as_json: bool) -> Result<(), CliError> {
    let summary = engine.pull().run().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        for line in format_summary(&summary) {
            println!("{line}");
        }
    }

    Ok(())
}

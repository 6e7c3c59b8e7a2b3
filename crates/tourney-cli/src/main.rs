//! Tourney CLI - operator interface for the tournament synchronization engine
//!
//! One-shot pulls, publication store inspection, and explicit push/claim/delete.

mod cli;
mod commands;
mod error;
#[cfg(test)]
mod tests;

use clap::Parser;
use tourney_core::config::EngineConfig;

use crate::cli::{Cli, Commands};
use crate::commands::common::{open_engine, open_store, resolve_db_path};
use crate::commands::completions::run_completions;
use crate::commands::list::run_list;
use crate::commands::portal::run_portal;
use crate::commands::pull::run_pull;
use crate::commands::push::{run_claim, run_delete, run_push};
use crate::commands::runs::run_runs;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tourney=info".parse().expect("valid directive"))
                .add_directive("tourney_core=info".parse().expect("valid directive")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Commands::List { limit, json } => run_list(&open_store(&db_path).await?, limit, json).await?,
        Commands::Runs { limit, json } => run_runs(&open_store(&db_path).await?, limit, json).await?,
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref())?,
        Commands::Pull { json } => {
            let engine = open_engine(open_store(&db_path).await?, &EngineConfig::from_env()?)?;
            run_pull(&engine, json).await?;
        }
        Commands::Push { id } => {
            let engine = open_engine(open_store(&db_path).await?, &EngineConfig::from_env()?)?;
            run_push(&engine, &id).await?;
        }
        Commands::Claim { id } => {
            let store = open_store(&db_path).await?;
            let engine = open_engine(store.clone(), &EngineConfig::from_env()?)?;
            run_claim(&store, &engine, &id).await?;
        }
        Commands::Delete { id } => {
            let store = open_store(&db_path).await?;
            let engine = open_engine(store.clone(), &EngineConfig::from_env()?)?;
            run_delete(&store, &engine, &id).await?;
        }
        Commands::Portal { json } => {
            let engine = open_engine(open_store(&db_path).await?, &EngineConfig::from_env()?)?;
            run_portal(&engine, json).await?;
        }
    }

    Ok(())
}

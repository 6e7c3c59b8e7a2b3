use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "tourney")]
#[command(about = "Operate the tournament synchronization engine from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to the publication store database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one pull from the submission portal
    Pull {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List tournaments in the publication store
    List {
        /// Number of tournaments to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push a locally owned tournament to the submission portal
    Push {
        /// Tournament ID
        id: String,
    },
    /// Take ownership of a mirrored tournament so it can be edited locally
    Claim {
        /// Tournament ID
        id: String,
    },
    /// Delete a locally owned tournament here and upstream
    Delete {
        /// Tournament ID
        id: String,
    },
    /// Show submission portal health and sync counts
    Portal {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show recent pull runs
    Runs {
        /// Number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

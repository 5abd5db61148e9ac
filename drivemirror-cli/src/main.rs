//! DriveMirror CLI - scheduled OneDrive backups to two clouds

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use drivemirror_core::UserId;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{check, config, history, run, status};

/// DriveMirror - back up OneDrive folders to OneDrive and Google Drive
#[derive(Parser)]
#[command(name = "dm", version, about, long_about = None)]
struct Cli {
    /// Identity whose backup configurations are used
    #[arg(long, global = true, env = "DRIVEMIRROR_USER", default_value = "default")]
    user: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every backup configuration of the user
    Run {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a single backup configuration
    RunConfig {
        /// Configuration ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage backup configurations
    Config {
        #[command(subcommand)]
        command: config::ConfigCommands,
    },

    /// Show backup history of a configuration
    History {
        /// Configuration ID
        config_id: i64,
        /// Show at most this many runs
        #[arg(long, short)]
        limit: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the latest backup of every configuration
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that both drives are reachable with the configured credentials
    Check {
        /// Show drive details
        #[arg(long, short)]
        verbose: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("DRIVEMIRROR_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    let result = dispatch(cli).await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    let user = UserId::new(cli.user);
    match cli.command {
        Commands::Run { json } => run::run_all(&user, json).await,
        Commands::RunConfig { id, json } => run::run_one(&user, id, json).await,
        Commands::Config { command } => config::run(&user, command).await,
        Commands::History { config_id, limit, json } => {
            history::run(&user, config_id, limit, json).await
        }
        Commands::Status { json } => status::run(&user, json).await,
        Commands::Check { verbose, json } => check::run(verbose, json).await,
    }
}

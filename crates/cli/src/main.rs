//! howheard CLI - Database migrations and attribution maintenance.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! hh-cli migrate
//!
//! # Retry attribution for pending orders
//! hh-cli reconcile --min-age-minutes 30
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `reconcile` - Resolve orders still waiting for a metafield write

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "hh-cli")]
#[command(author, version, about = "howheard CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Retry attribution for orders still pending
    Reconcile {
        /// Only consider orders received at least this many minutes ago
        #[arg(long, default_value_t = 60)]
        min_age_minutes: i64,
    },
}

#[tokio::main]
async fn main() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "howheard_cli=info,howheard_app=info".into());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Reconcile { min_age_minutes } => {
            commands::reconcile::run(min_age_minutes).await?;
        }
    }
    Ok(())
}

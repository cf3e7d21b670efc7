use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use watchup_service::config::Config;
use watchup_service::database::Database;
use watchup_service::database::models::Subscription;
use watchup_service::gate::issue_api_key;
use watchup_service::{build_scheduler, open_store};

#[derive(Parser, Debug)]
#[command(author, version, about = "Watchup monitoring engine", long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler until interrupted
    Run,
    /// Run a single scheduling cycle and exit
    Once,
    /// Create or regenerate a user's API key and print it
    IssueKey {
        #[arg(long)]
        user: String,
    },
    /// Grant a user access to a project
    Grant {
        #[arg(long)]
        user: String,
        #[arg(long)]
        project: String,
        /// Paid plan expiry (RFC 3339); omit for no expiry
        #[arg(long)]
        expires_at: Option<DateTime<Utc>>,
        #[arg(long)]
        inactive: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    logger::init_tracing();

    let args = Args::parse();
    let config = Config::from_config(args.config.as_ref()).context("failed to load configuration")?;
    info!("\n{config}");

    let database = open_store(&config).await?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => {
            let scheduler = build_scheduler(&config, database)?;
            scheduler
                .run_until(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!("Failed to listen for shutdown signal: {e}");
                    }
                })
                .await;
        }
        Command::Once => {
            let summary = build_scheduler(&config, database)?.run_cycle().await?;
            info!(
                selected = summary.selected,
                succeeded = summary.succeeded,
                failed = summary.failed,
                "Cycle complete"
            );
        }
        Command::IssueKey { user } => {
            let api_key = issue_api_key(database.as_ref(), &user, Utc::now()).await?;
            println!("{api_key}");
        }
        Command::Grant { user, project, expires_at, inactive } => {
            let subscription = Subscription {
                user_id: user,
                project_id: project,
                expires_at,
                is_active: !inactive,
            };
            database.upsert_subscription(&subscription, Utc::now()).await?;
            info!(
                user_id = %subscription.user_id,
                project_id = %subscription.project_id,
                active = subscription.is_active,
                "Subscription granted"
            );
        }
    }

    Ok(())
}

//! LocalLoop CLI - borrow and lend items around campus from the terminal

mod auth;
mod cli;
mod commands;
mod config_profiles;
mod error;

#[cfg(test)]
mod tests;

use clap::Parser;
use tracing_subscriber::filter::{Directive, EnvFilter};

use crate::cli::{Cli, Commands};
use crate::commands::auth_cmd::run_auth;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::items::run_items;
use crate::commands::listings::run_listings;
use crate::commands::messages::run_messages;
use crate::commands::notifications::run_notifications;
use crate::commands::profile::run_profile;
use crate::commands::requests::run_requests;
use crate::commands::transactions::run_transactions;
use crate::commands::watch::run_watch;
use crate::error::CliError;

const DEFAULT_LOG_DIRECTIVE: &str = "localloop=info";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let profile = cli.profile.as_deref();

    match cli.command {
        Commands::Auth { command } => run_auth(command, profile).await?,
        Commands::Config { command } => run_config(command, profile).await?,
        Commands::Listings { command, filter } => run_listings(command, filter, profile).await?,
        Commands::Profile { command } => run_profile(command, profile).await?,
        Commands::Items { command } => run_items(command, profile).await?,
        Commands::Requests { command } => run_requests(command, profile).await?,
        Commands::Transactions { command } => run_transactions(command, profile).await?,
        Commands::Messages { command } => run_messages(command, profile).await?,
        Commands::Notifications { command } => run_notifications(command, profile)?,
        Commands::Watch => run_watch(profile).await?,
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref())?,
    }

    Ok(())
}

fn init_tracing() {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = DEFAULT_LOG_DIRECTIVE.parse::<Directive>() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

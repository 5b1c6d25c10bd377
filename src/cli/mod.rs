pub mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "artisan")]
#[command(about = "Operator CLI for the automatic-message pipeline")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run database migrations
    Migrate,
    /// Start the server (scheduler, consumer, demo HTTP/WS surface)
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run the Planner once, outside the cron schedule
    Plan,
    /// Run the Dispatcher once, outside the cron schedule
    Dispatch,
}

pub async fn run_cli(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Migrate => commands::migrate::handle_migrate_command(),
        Commands::Serve { host, port } => commands::serve::handle_serve_command(host, port).await,
        Commands::Plan => commands::plan::handle_plan_command().await,
        Commands::Dispatch => commands::dispatch::handle_dispatch_command().await,
    }
}

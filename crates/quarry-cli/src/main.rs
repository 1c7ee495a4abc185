//! Quarry CLI - document extraction queue, worker and case reconciliation.

use clap::Parser;
use quarry_cli::commands;
use quarry_cli::{App, Cli, Command, Formatter, QuarryConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> quarry_cli::Result<()> {
    let cli = Cli::parse();

    let mut config = QuarryConfig::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.store.path = db;
    }

    let format = cli.format.map(Into::into).unwrap_or(config.output.format);
    let color_enabled = !cli.no_color && config.output.color;
    let formatter = Formatter::new(format, color_enabled);

    let app = App::open(config)?;

    match cli.command {
        Command::Worker(args) => commands::execute_worker(args, &app, &formatter).await?,
        Command::Enqueue(args) => commands::execute_enqueue(args, &app, &formatter).await?,
        Command::Status { document_id } => commands::execute_status(document_id, &app, &formatter).await?,
        Command::Jobs(args) => commands::execute_jobs(args, &app, &formatter).await?,
        Command::Result { document_id } => commands::execute_result(document_id, &app, &formatter).await?,
        Command::Snapshot(args) => commands::execute_snapshot(args, &app, &formatter).await?,
        Command::Retry { document_id } => commands::execute_retry(document_id, &app, &formatter).await?,
        Command::Resume { document_id } => commands::execute_resume(document_id, &app, &formatter).await?,
        Command::KillSwitch { action } => commands::execute_kill_switch(action, &app, &formatter).await?,
        Command::Fields => commands::execute_fields(&app, &formatter).await?,
        Command::Audit(args) => commands::execute_audit(args, &app, &formatter).await?,
    }

    Ok(())
}

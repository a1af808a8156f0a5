//! PKV Belege - receipts for private health insurance, kept offline.
//!
//! Command line front end: record keeping, backup export and import, and
//! the offline cache of the web application shell.

mod app;
mod cli;

use std::io::{self, Write};

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::App;
use cli::{CacheCommand, Cli, Command, UpdateCommand};

/// Directory for daily rolling log files; stderr only when unset.
const ENV_LOG_DIR: &str = "PKV_BELEGE_LOG_DIR";

/// Log file name prefix inside the log directory
const LOG_FILE_PREFIX: &str = "pkv-belege.log";

/// Initialize the tracing subscriber for logging.
///
/// The returned guard flushes the log file on drop and must be held
/// until the program exits.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var_os(ENV_LOG_DIR) {
        Some(dir) if !dir.is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();

    let command = Cli::parse().command;

    info!(?command, "PKV Belege starting");
    let mut app = App::new()?;

    if let Err(e) = run(&mut app, command).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(app: &mut App, command: Command) -> Result<()> {
    let output = match command {
        Command::List { year } => app.list(year),
        Command::Add(record) => app.add(record.date, record.amount, &record.description())?,
        Command::Edit { id, record } => {
            app.edit(&id, record.date, record.amount, &record.description())?
        }
        Command::Delete { id } => app.delete(&id)?,
        Command::Overview { year } => app.overview(year),
        Command::Settings {
            deductible,
            reimbursement,
        } => app.settings(deductible, reimbursement)?,
        Command::Status => app.status()?,
        Command::Export { dir } => {
            let path = app.export(&dir)?;
            format!("Backup written to {}", path.display())
        }
        Command::Import { file, mode } => app.import(&file, mode.into())?,
        Command::Cache(cache) => match cache {
            CacheCommand::Install => app.cache_install().await?,
            CacheCommand::Fetch { path, navigate } => {
                let response = app.cache_fetch(&path, navigate).await?;
                info!(status = %response.status, source = ?response.source, "Fetched {}", path);
                io::stdout().write_all(&response.body)?;
                return Ok(());
            }
            CacheCommand::Version => app.cache_version().await?,
            CacheCommand::Clear => app.cache_clear().await?,
        },
        Command::Update(update) => match update {
            UpdateCommand::Check => app.update_check().await?,
            UpdateCommand::Apply => app.update_apply().await?,
            UpdateCommand::Refresh => app.update_refresh().await?,
        },
    };

    if !output.is_empty() {
        println!("{}", output.trim_end());
    }
    Ok(())
}

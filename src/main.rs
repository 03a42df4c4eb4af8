//! Conductor - error-recovery core
//!
//! Main entry point for the Conductor CLI and worker runtime.

mod adapters;
mod cli;
mod cmd_config;
mod cmd_cron;
mod cmd_run;
mod settings;

use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use conductor_config::ConfigLoader;

use cli::{Cli, Commands, ConfigAction, CronAction};

/// Keeps the file writer flushing until the process exits.
static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Initialize tracing with console and daily-rotated file output.
///
/// Log files are written to `<data_dir>/logs/` and the last 30 are kept.
fn init_tracing(data_dir: &Path, log_json: bool) -> Result<()> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("conductor")
        .filename_suffix("log")
        .max_log_files(30)
        .build(&log_dir)
        .context("Failed to create log file appender")?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let console = if log_json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(true).with_ansi(true).boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| ConfigLoader::data_dir(&config));

    init_tracing(&data_dir, cli.log_json)?;

    match cli.command {
        None | Some(Commands::Run) => cmd_run::run(config, &data_dir).await,
        Some(Commands::Cron { action }) => match action {
            CronAction::Next {
                expression,
                count,
                timezone,
            } => cmd_cron::cron_next(&expression, count, &timezone),
            CronAction::Validate { expression } => cmd_cron::cron_validate(&expression),
        },
        Some(Commands::Config { action }) => match action {
            ConfigAction::Validate => cmd_config::config_validate(&config),
            ConfigAction::Show => cmd_config::config_show(&config),
        },
    }
}

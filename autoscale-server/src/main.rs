use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod cli;
mod commands;
mod config;

use cli::{Args, Mode};
use commands::client::ApiClient;
use config::Config;

/// Initialize tracing:
/// 1. Console output (stderr) - human readable
/// 2. File output ($AUTOSCALE_LOG_DIR/autoscale.log) - JSON, only when the directory is set
///
/// The returned guard flushes the file writer and must outlive the program's work.
fn initialize_tracing(log_dir: Option<PathBuf>) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "info,\
         autoscale_server=debug,\
         autoscale_reconciler=debug,\
         kube=info"
            .into()
    });

    let console_layer = fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            let file_appender = tracing_appender::rolling::never(&dir, "autoscale.log");
            let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer()
                .json()
                .with_writer(file_writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let log_dir = std::env::var_os("AUTOSCALE_LOG_DIR")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from);
    let _guard = initialize_tracing(log_dir)?;

    match args.mode {
        Mode::Api { bind } => commands::server::run_api(Config::load()?, bind).await,
        mode => {
            let client = ApiClient::new(&args.target, Duration::from_secs(args.timeout))?;
            run_client(&client, mode).await
        }
    }
}

async fn run_client(client: &ApiClient, mode: Mode) -> Result<()> {
    match mode {
        Mode::Api { .. } => anyhow::bail!("api mode does not take a client"),
        Mode::Create { name, app, min, max } => {
            commands::instance::run_create(client, name, app, min, max).await
        }
        Mode::Delete { name } => commands::instance::run_delete(client, name).await,
        Mode::Status { name } => commands::instance::run_status(client, name).await,
        Mode::Triggers { command } => commands::trigger::handle_command(client, command).await,
    }
}

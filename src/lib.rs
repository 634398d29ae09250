pub mod backend;
pub mod commands;
pub mod config;
pub mod error;
pub mod helpers;
pub mod logging;
pub mod stores;
pub mod types;
pub mod utils;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::backend::FileHistoryBackend;
use crate::commands::history::NewRequest;
use crate::config::{get_config_path, load_config_from_path, AppConfig, DataPaths};
use crate::helpers::migration::migrate_to_split_storage;
use crate::stores::RequestHistoryStore;

pub use crate::backend::HistoryBackend;
pub use crate::error::{HistoryError, Result};
pub use crate::types::{RequestHistory, RequestLog};

#[derive(Parser)]
#[command(name = "proxypal-history")]
#[command(about = "Inspect and maintain ProxyPal request history")]
#[command(version)]
pub struct Cli {
    /// Directory holding history.json and aggregate.json
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file (defaults to the ProxyPal config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lifetime and today's totals
    Stats,
    /// Most recent requests, oldest first
    Recent {
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Requests since local midnight
    Today,
    /// Record a request by hand
    Add {
        #[arg(long)]
        model: String,
        #[arg(long)]
        provider: Option<String>,
        #[arg(long, default_value = "POST")]
        method: String,
        #[arg(long, default_value = "/v1/chat/completions")]
        path: String,
        #[arg(long, default_value_t = 200)]
        status: u16,
        #[arg(long, default_value_t = 0)]
        duration_ms: u64,
        #[arg(long)]
        tokens_in: Option<u32>,
        #[arg(long)]
        tokens_out: Option<u32>,
        #[arg(long)]
        tokens_cached: Option<u32>,
    },
    /// Clear the history view; --persist also wipes history.json
    Clear {
        #[arg(long)]
        persist: bool,
    },
    /// Usage analytics from the aggregate
    Usage,
    /// Record every request found in a proxy log file
    Ingest { log_file: PathBuf },
    /// Build aggregate.json from an older history.json
    Migrate,
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Read the config while `subscriber` is active; the global one depends on the result.
fn load_startup_config<S>(config_path: Option<PathBuf>, subscriber: S) -> AppConfig
where
    S: tracing::Subscriber + Send + Sync + 'static,
{
    tracing::subscriber::with_default(subscriber, || {
        let path = config_path.unwrap_or_else(get_config_path);
        load_config_from_path(&path)
    })
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_startup_config(cli.config.clone(), logging::bootstrap_subscriber());

    logging::init_logging(&config.log_level, config.log_json);

    let paths = match cli.data_dir {
        Some(dir) => DataPaths::new(dir),
        None => config.data_paths(),
    };
    paths.ensure_dir()?;
    tracing::debug!(dir = %paths.dir().display(), "using data directory");

    if let Commands::Migrate = cli.command {
        let migrated = migrate_to_split_storage(&paths);
        return print_json(&serde_json::json!({ "migrated": migrated }));
    }
    migrate_to_split_storage(&paths);

    if let Commands::Usage = cli.command {
        return print_json(&commands::usage::get_usage_stats(&paths));
    }

    let backend = Arc::new(
        FileHistoryBackend::new(paths.clone()).with_usage_stats(config.usage_stats_enabled),
    );
    let store = RequestHistoryStore::new(backend.clone());
    store.load_history().await;

    match cli.command {
        Commands::Stats => print_json(&commands::history::get_history_summary(&store)),
        Commands::Recent { limit } => {
            print_json(&commands::history::get_recent_requests(&store, limit))
        }
        Commands::Today => print_json(&commands::history::get_today_requests(&store)),
        Commands::Add {
            model,
            provider,
            method,
            path,
            status,
            duration_ms,
            tokens_in,
            tokens_out,
            tokens_cached,
        } => {
            let request = commands::history::add_request(
                &store,
                NewRequest {
                    model,
                    provider,
                    method,
                    path,
                    status,
                    duration_ms,
                    tokens_in,
                    tokens_out,
                    tokens_cached,
                },
            )
            .await;
            print_json(&request)
        }
        Commands::Clear { persist } => {
            commands::history::clear_history(&store, backend.as_ref(), persist).await?;
            print_json(&commands::history::get_history_summary(&store))
        }
        Commands::Ingest { log_file } => {
            let report = commands::ingest::ingest_log_file(&store, &log_file).await?;
            print_json(&report)
        }
        Commands::Usage | Commands::Migrate => Ok(()),
    }
}

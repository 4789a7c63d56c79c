//! Campus Service - background sync for the campus offline cache.
//!
//! Run with: `cargo run -p campus-service`

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use campus_core::NetworkProbe;
use campus_service::{AppState, Config, Scheduler, StatusSnapshot, TcpProbe};

/// Campus Service - keeps the offline campus cache in sync.
#[derive(Parser, Debug)]
#[command(name = "campus-service")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Campus API base URL (overrides config).
    #[arg(short, long, global = true)]
    api: Option<String>,

    /// Database path (overrides config).
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Log level for campus crates (error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the sync daemon in the foreground (default behavior).
    Run,

    /// Run a single sync pass and exit.
    Sync {
        /// Also refresh buildings, places and events from the API.
        #[arg(long)]
        refresh: bool,

        /// Print the pass report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show cache contents and pending work.
    Status {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Delete every cached record.
    Reset {
        /// Discard edits and visits that have not reached the server.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let config = load_config(&args)?;
    let state = AppState::build(config)?;

    match args.command {
        Some(Command::Sync { refresh, json }) => sync_once(&state, refresh, json).await,
        Some(Command::Status { json }) => print_status(&state.status()?, json),
        Some(Command::Reset { force }) => {
            let cleared = state.reset(force)?;
            println!(
                "Cleared {} building(s), {} place(s), {} event(s), {} event detail(s), {} visit(s)",
                cleared.buildings,
                cleared.places,
                cleared.events,
                cleared.event_details,
                cleared.visits
            );
            Ok(())
        }
        Some(Command::Run) | None => run_daemon(state).await,
    }
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("campus_service={}", level).parse()?)
                .add_directive(format!("campus_core={}", level).parse()?)
                .add_directive(format!("campus_store={}", level).parse()?),
        )
        .init();
    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::load_default().unwrap_or_else(|e| {
            warn!("Ignoring default configuration: {}", e);
            Config::default()
        }),
    };

    // Override config with CLI args
    if let Some(api) = &args.api {
        config.remote.base_url = api.clone();
    }
    if let Some(db_path) = &args.database {
        config.storage.path = db_path.clone();
    }

    config.validate()?;
    Ok(config)
}

async fn run_daemon(state: Arc<AppState>) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let scheduler = Scheduler::new(Arc::clone(&state)).start(cancel.clone());
    info!("Sync daemon running, press Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    info!("Shutting down");
    scheduler.shutdown().await;
    Ok(())
}

async fn sync_once(state: &AppState, refresh: bool, json: bool) -> anyhow::Result<()> {
    let config = &state.config;
    let timeout = Duration::from_secs(config.connectivity.probe_timeout_secs);
    let online = match TcpProbe::from_base_url(&config.remote.base_url, timeout) {
        Some(probe) => probe.check().await,
        None => true,
    };
    state.monitor.report(online);

    if !online {
        anyhow::bail!("campus API at {} is unreachable", config.remote.base_url);
    }

    if refresh {
        let buildings = state.buildings.fetch_all().await;
        let places = state.places.fetch_all().await;
        let events = state.events.fetch_all().await;
        for (name, failure) in [
            ("buildings", buildings.error_message()),
            ("places", places.error_message()),
            ("events", events.error_message()),
        ] {
            if let Some(message) = failure {
                warn!("Refreshing {} failed: {}", name, message);
            }
        }
    }

    let report = state.coordinator.run_once().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Synced {} edit(s), {} failed, {} deferred; {} visit(s) reported",
            report.synced.len(),
            report.failed.len(),
            report.deferred,
            report.visits_synced
        );
    }

    if report.storage_errors > 0 {
        anyhow::bail!("{} cache error(s) during sync", report.storage_errors);
    }
    Ok(())
}

fn print_status(status: &StatusSnapshot, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(status)?);
        return Ok(());
    }

    let counts = &status.counts;
    println!("API:       {}", status.api);
    println!("Database:  {}", status.database.display());
    println!("Buildings: {}", counts.buildings);
    println!("Places:    {}", counts.places);
    println!("Events:    {}", counts.events);
    println!(
        "Details:   {} ({} waiting for the server)",
        counts.event_details, counts.unsynced_details
    );
    println!(
        "Visits:    {} ({} not reported)",
        counts.visits, counts.unsynced_visits
    );
    Ok(())
}

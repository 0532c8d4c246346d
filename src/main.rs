//! Reef Monitoring Service - Main Daemon
//!
//! A server-side daemon that:
//! 1. Catches up missing daily summaries for every reef on startup
//! 2. Computes yesterday's summary for every reef once per day
//! 3. Writes summaries and time-series points to PostgreSQL
//!
//! Usage:
//!   cargo run --release                       # Catch up, then run the daily loop
//!   cargo run --release -- --once             # Catch up and exit
//!   cargo run --release -- --config other.toml
//!
//! Environment:
//!   DATABASE_URL    - PostgreSQL connection string
//!   SOFAR_API_TOKEN - provider token (name configurable in reefmon.toml)

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use reefmon_service::backfill::BackfillOrchestrator;
use reefmon_service::config::{DEFAULT_CONFIG_PATH, load_config};
use reefmon_service::daemon::Daemon;
use reefmon_service::daily::DailyAggregator;
use reefmon_service::db;
use reefmon_service::ingest::sofar::SofarClient;
use reefmon_service::ingest::ProviderClient;
use reefmon_service::logging::{init_logging, log_backfill_summary};
use reefmon_service::store::postgres::REQUIRED_TABLES;
use reefmon_service::store::{PersistenceGateway, PgGateway};

#[derive(Parser, Debug)]
#[command(name = "reefmon_service", about = "Reef bleaching-risk daily pipeline")]
struct Args {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Run the startup catch-up and exit
    #[arg(long)]
    once: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    println!("🪸 Reef Monitoring Service");
    println!("==========================\n");

    dotenv::dotenv().ok();
    let config = load_config(&args.config).context("loading configuration")?;

    let provider: Arc<dyn ProviderClient> =
        Arc::new(SofarClient::from_config(&config.provider).context("building provider client")?);
    let client = db::connect_and_verify(&REQUIRED_TABLES)?;
    let store: Arc<dyn PersistenceGateway> = Arc::new(PgGateway::new(client));
    info!("database verified");

    let aggregator = Arc::new(DailyAggregator::new(provider, Arc::clone(&store)));
    let orchestrator =
        BackfillOrchestrator::new(aggregator, Arc::clone(&store), config.backfill.clone());
    let mut daemon = Daemon::new(config.daemon.clone(), orchestrator, store);

    let report = daemon.catch_up(Utc::now().date_naive()).context("startup catch-up")?;
    log_backfill_summary(
        "Startup catch-up",
        report.sites.len(),
        report.succeeded(),
        report.failed(),
    );

    if args.once {
        return Ok(());
    }

    println!("🔄 Starting daily update loop (Ctrl+C to stop)\n");
    daemon.run()
}

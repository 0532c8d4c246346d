//! Print the current conditions of one reef as JSON.
//!
//! Usage:
//!   live_data --site 12
//!
//! Fields that could not be determined are omitted; an unknown alert level
//! is printed as `null`.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use reefmon_service::config::{DEFAULT_CONFIG_PATH, load_config};
use reefmon_service::db;
use reefmon_service::ingest::sofar::SofarClient;
use reefmon_service::live::LiveDataAssembler;
use reefmon_service::logging::init_logging;
use reefmon_service::store::postgres::REQUIRED_TABLES;
use reefmon_service::store::PgGateway;

#[derive(Parser, Debug)]
#[command(name = "live_data", about = "Current conditions for one reef")]
struct Args {
    /// Reef id
    #[arg(long)]
    site: i32,

    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    dotenv::dotenv().ok();

    let config = load_config(&args.config).context("loading configuration")?;
    let provider = SofarClient::from_config(&config.provider).context("building provider client")?;
    let store = PgGateway::new(db::connect_and_verify(&REQUIRED_TABLES)?);

    let assembler =
        LiveDataAssembler::new(Arc::new(provider), Arc::new(store), config.live.clone());
    let live = assembler.get_live_data(args.site)?;

    println!("{}", serde_json::to_string_pretty(&live)?);
    Ok(())
}

//! Backfill daily summaries and time-series points for a set of reefs.
//!
//! Usage:
//!   backfill --days 30                               # every reef, last 30 days
//!   backfill --sites 1,2 --start 2020-01-01 --end 2020-03-31
//!   backfill --sites 4 --metric satellite_temperature --years 2019,2020
//!
//! With `--metric`, only that metric is recomputed; every other stored
//! field is left untouched.

use anyhow::{Context, bail};
use chrono::{NaiveDate, Utc};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use reefmon_service::backfill::{BackfillOrchestrator, BackfillReport, DateRange};
use reefmon_service::config::{DEFAULT_CONFIG_PATH, load_config};
use reefmon_service::daily::DailyAggregator;
use reefmon_service::db;
use reefmon_service::ingest::sofar::SofarClient;
use reefmon_service::ingest::ProviderClient;
use reefmon_service::logging::init_logging;
use reefmon_service::model::Metric;
use reefmon_service::store::postgres::REQUIRED_TABLES;
use reefmon_service::store::{PersistenceGateway, PgGateway};

#[derive(Parser, Debug)]
#[command(name = "backfill", about = "Recompute daily reef data over a date range")]
struct Args {
    /// Reef ids (comma separated); all reefs when omitted
    #[arg(long, value_delimiter = ',')]
    sites: Vec<i32>,

    /// First date (YYYY-MM-DD, reef-local)
    #[arg(long, requires = "end", conflicts_with_all = ["days", "years"])]
    start: Option<NaiveDate>,

    /// Last date, inclusive
    #[arg(long, requires = "start")]
    end: Option<NaiveDate>,

    /// Number of complete days ending yesterday
    #[arg(long, conflicts_with = "years")]
    days: Option<u64>,

    /// Recompute a single metric, e.g. satellite_temperature
    #[arg(long, value_parser = parse_metric)]
    metric: Option<Metric>,

    /// Whole calendar years (comma separated); requires --metric
    #[arg(long, value_delimiter = ',', requires = "metric")]
    years: Vec<i32>,

    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[arg(short, long)]
    verbose: bool,
}

fn parse_metric(s: &str) -> Result<Metric, String> {
    Metric::parse(s).ok_or_else(|| {
        let known: Vec<&str> = Metric::ALL.iter().map(|m| m.as_str()).collect();
        format!("unknown metric '{}' (expected one of: {})", s, known.join(", "))
    })
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    dotenv::dotenv().ok();

    let config = load_config(&args.config).context("loading configuration")?;
    let today = Utc::now().date_naive();

    let ranges: Vec<DateRange> = if !args.years.is_empty() {
        DateRange::from_years(&args.years, today)?
    } else if let (Some(start), Some(end)) = (args.start, args.end) {
        vec![DateRange::new(start, end)?]
    } else if let Some(days) = args.days {
        vec![DateRange::last_days(today, days)?]
    } else {
        bail!("one of --start/--end, --days or --years is required");
    };

    let provider: Arc<dyn ProviderClient> =
        Arc::new(SofarClient::from_config(&config.provider).context("building provider client")?);
    let client = db::connect_and_verify(&REQUIRED_TABLES)?;
    let store: Arc<dyn PersistenceGateway> = Arc::new(PgGateway::new(client));
    let aggregator = Arc::new(DailyAggregator::new(provider, Arc::clone(&store)));
    let orchestrator = BackfillOrchestrator::new(aggregator, store, config.backfill.clone());

    let report: BackfillReport = match args.metric {
        Some(metric) => orchestrator.backfill_metric_years(&args.sites, ranges, metric)?,
        None => {
            let mut report = BackfillReport::default();
            for range in ranges {
                report.merge(orchestrator.backfill(&args.sites, range)?);
            }
            report
        }
    };

    for site in &report.sites {
        println!(
            "reef {:>5}: {} inserted, {} updated, {} failed days, {} points{}",
            site.site_id,
            site.days_inserted,
            site.days_updated,
            site.days_failed,
            site.points_inserted,
            site.error.as_deref().map(|e| format!(" ({})", e)).unwrap_or_default()
        );
    }

    if report.failed() > 0 {
        bail!("{} of {} reefs had failures", report.failed(), report.sites.len());
    }
    Ok(())
}

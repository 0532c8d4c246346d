/// Core daemon implementation for the reef monitoring service
///
/// This module implements the main daemon loop that:
/// 1. Detects staleness of each reef's daily summaries
/// 2. Backfills missing days (bounded by `backfill_days`)
/// 3. Processes "yesterday" for every reef once per UTC day
/// 4. Sleeps for the poll interval between checks

use chrono::{Days, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::backfill::{BackfillOrchestrator, BackfillReport, DateRange, SiteReport};
use crate::config::DaemonConfig;
use crate::model::Site;
use crate::store::{PersistenceGateway, StoreError};

// ---------------------------------------------------------------------------
// Staleness
// ---------------------------------------------------------------------------

/// How far behind a reef's stored summaries are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// Nothing stored yet.
    NoData,
    /// Summaries are complete through yesterday.
    Current,
    /// Days missing between the latest summary and yesterday.
    Behind { latest: NaiveDate, missing_days: i64 },
}

pub fn staleness(latest: Option<NaiveDate>, today: NaiveDate) -> Staleness {
    let Some(latest) = latest else {
        return Staleness::NoData;
    };
    let missing_days = (today - latest).num_days() - 1;
    if missing_days <= 0 {
        Staleness::Current
    } else {
        Staleness::Behind { latest, missing_days }
    }
}

/// Days to catch up for a reef, at most `backfill_days` back from today.
pub fn catch_up_range(
    staleness: Staleness,
    today: NaiveDate,
    backfill_days: i64,
) -> Option<DateRange> {
    let yesterday = today.checked_sub_days(Days::new(1))?;
    let horizon = today.checked_sub_days(Days::new(backfill_days.max(1) as u64))?;
    let start = match staleness {
        Staleness::Current => return None,
        Staleness::NoData => horizon,
        Staleness::Behind { latest, .. } => latest.succ_opt()?.max(horizon),
    };
    DateRange::new(start, yesterday).ok()
}

// ---------------------------------------------------------------------------
// Daemon State
// ---------------------------------------------------------------------------

pub struct Daemon {
    config: DaemonConfig,
    orchestrator: BackfillOrchestrator,
    store: Arc<dyn PersistenceGateway>,
    /// UTC date of the last completed daily update.
    last_daily_run: Option<NaiveDate>,
}

impl Daemon {
    pub fn new(
        config: DaemonConfig,
        orchestrator: BackfillOrchestrator,
        store: Arc<dyn PersistenceGateway>,
    ) -> Self {
        Self {
            config,
            orchestrator,
            store,
            last_daily_run: None,
        }
    }

    /// Staleness of every reef as of `today`.
    pub fn check_staleness(&self, today: NaiveDate) -> Result<Vec<(i32, Staleness)>, StoreError> {
        Ok(self
            .site_staleness(today)?
            .into_iter()
            .map(|(site, state)| (site.id, state))
            .collect())
    }

    fn site_staleness(&self, today: NaiveDate) -> Result<Vec<(Site, Staleness)>, StoreError> {
        let sites = self.store.find_sites(&[])?;
        let mut out = Vec::with_capacity(sites.len());
        for site in sites {
            let latest = self.store.latest_daily_date(site.id)?;
            out.push((site, staleness(latest, today)));
        }
        Ok(out)
    }

    /// Startup catch-up: backfills every stale reef through yesterday.
    /// Reefs with the same missing range share one pooled run. A group
    /// whose run fails is reported as aborted; the other groups still run.
    pub fn catch_up(&mut self, today: NaiveDate) -> Result<BackfillReport, StoreError> {
        let mut groups: BTreeMap<DateRange, Vec<i32>> = BTreeMap::new();
        for (site, state) in self.site_staleness(today)? {
            let (site_id, reef) = (site.id, site.label());
            match state {
                Staleness::Current => info!(site_id, %reef, "data is current"),
                Staleness::NoData => info!(site_id, %reef, "no data found (needs backfill)"),
                Staleness::Behind { latest, missing_days } => {
                    info!(site_id, %reef, %latest, missing_days, "data is stale")
                }
            }
            if let Some(range) = catch_up_range(state, today, self.config.backfill_days) {
                groups.entry(range).or_default().push(site_id);
            }
        }

        let mut report = BackfillReport::default();
        for (range, site_ids) in groups {
            info!(reefs = site_ids.len(), start = %range.start, end = %range.end, "catching up");
            match self.orchestrator.backfill(&site_ids, range) {
                Ok(group) => report.merge(group),
                Err(e) => {
                    error!(
                        ?site_ids,
                        start = %range.start,
                        end = %range.end,
                        error = %e,
                        "catch-up failed; continuing with the next group"
                    );
                    report.merge(BackfillReport {
                        sites: site_ids
                            .iter()
                            .map(|id| SiteReport::aborted(*id, e.to_string()))
                            .collect(),
                    });
                }
            }
        }
        self.last_daily_run = Some(today);
        Ok(report)
    }

    /// Processes yesterday for every reef, once per UTC day. Returns `None`
    /// when today's update already ran.
    pub fn run_daily_update(
        &mut self,
        today: NaiveDate,
    ) -> Result<Option<BackfillReport>, StoreError> {
        if self.last_daily_run == Some(today) {
            return Ok(None);
        }
        let Some(yesterday) = today.checked_sub_days(Days::new(1)) else {
            return Ok(None);
        };
        info!(date = %yesterday, "running daily update");
        let report = self.orchestrator.backfill(&[], DateRange::single(yesterday))?;
        self.last_daily_run = Some(today);
        Ok(Some(report))
    }

    /// Main daemon loop (runs indefinitely)
    pub fn run(&mut self) -> ! {
        info!(poll_interval_minutes = self.config.poll_interval_minutes, "starting daemon loop");

        loop {
            let start = Utc::now();

            match self.run_daily_update(start.date_naive()) {
                Ok(Some(report)) => info!(
                    reefs = report.sites.len(),
                    failed = report.failed(),
                    points = report.points_inserted(),
                    "daily update complete"
                ),
                Ok(None) => {}
                Err(e) => error!(error = %e, "daily update failed; retrying next poll"),
            }

            // Sleep until next poll interval
            let elapsed = (Utc::now() - start).num_seconds();
            let sleep_seconds = (self.config.poll_interval_minutes * 60) as i64 - elapsed;
            if sleep_seconds > 0 {
                std::thread::sleep(std::time::Duration::from_secs(sleep_seconds as u64));
            } else {
                warn!(elapsed, "update overran the poll interval");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

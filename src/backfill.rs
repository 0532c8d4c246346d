/// Backfill orchestrator.
///
/// Drives the daily aggregation engine over a set of reefs and a date range
/// and persists the results:
///   - each (reef, date) summary is upserted (conflicts merge non-null fields)
///   - time-series points are inserted in fixed-size batches (duplicates skipped)
///   - the "latest data" view is refreshed once at the end of the run
///
/// Reefs run on a bounded thread pool; a failure for one reef or one date
/// is logged and counted, never propagated to siblings. Re-running over an
/// already-populated range leaves storage unchanged.

use chrono::{Datelike, Days, NaiveDate};
use std::collections::BTreeSet;
use std::sync::{Arc, mpsc};
use thiserror::Error;
use threadpool::ThreadPool;
use tracing::{debug, error, info, warn};

use crate::config::BackfillConfig;
use crate::daily::DailyAggregator;
use crate::logging::log_backfill_summary;
use crate::model::{Metric, Site, SourceType, TimeSeriesPoint};
use crate::store::{PersistenceGateway, StoreError, UpsertOutcome};

// ---------------------------------------------------------------------------
// Date ranges
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq)]
pub enum DateRangeError {
    #[error("start date {start} is after end date {end}")]
    Inverted { start: NaiveDate, end: NaiveDate },
    #[error("no complete day before {today} in the requested years")]
    NothingToBackfill { today: NaiveDate },
}

/// Inclusive range of local calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DateRangeError> {
        if start > end {
            return Err(DateRangeError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn single(date: NaiveDate) -> Self {
        Self { start: date, end: date }
    }

    /// The `days` complete days ending yesterday.
    pub fn last_days(today: NaiveDate, days: u64) -> Result<Self, DateRangeError> {
        let end = today.checked_sub_days(Days::new(1)).unwrap_or(today);
        let start = today.checked_sub_days(Days::new(days.max(1))).unwrap_or(end);
        Self::new(start, end)
    }

    /// Jan 1 to Dec 31 of each year, clamped to yesterday. Years with no
    /// complete day are dropped.
    pub fn from_years(years: &[i32], today: NaiveDate) -> Result<Vec<Self>, DateRangeError> {
        let yesterday = today.checked_sub_days(Days::new(1)).unwrap_or(today);
        let unique: BTreeSet<i32> = years.iter().copied().collect();
        let ranges: Vec<Self> = unique
            .into_iter()
            .filter_map(|year| {
                let start = NaiveDate::from_ymd_opt(year, 1, 1)?;
                let end = NaiveDate::from_ymd_opt(year, 12, 31)?.min(yesterday);
                Self::new(start, end).ok()
            })
            .collect();
        if ranges.is_empty() {
            return Err(DateRangeError::NothingToBackfill { today });
        }
        Ok(ranges)
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take_while(move |d| *d <= self.end)
    }

    pub fn len(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }

    /// A range always holds at least one day.
    pub fn is_empty(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteReport {
    pub site_id: i32,
    pub days_inserted: usize,
    pub days_updated: usize,
    pub days_failed: usize,
    pub points_inserted: usize,
    pub batches_failed: usize,
    /// Set when the reef could not be processed at all.
    pub error: Option<String>,
}

impl SiteReport {
    fn new(site_id: i32) -> Self {
        Self {
            site_id,
            ..Self::default()
        }
    }

    pub(crate) fn aborted(site_id: i32, reason: String) -> Self {
        Self {
            site_id,
            error: Some(reason),
            ..Self::default()
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.days_failed == 0 && self.batches_failed == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackfillReport {
    /// One entry per reef, ordered by reef id.
    pub sites: Vec<SiteReport>,
}

impl BackfillReport {
    pub fn succeeded(&self) -> usize {
        self.sites.iter().filter(|s| s.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.sites.len() - self.succeeded()
    }

    pub fn site(&self, site_id: i32) -> Option<&SiteReport> {
        self.sites.iter().find(|s| s.site_id == site_id)
    }

    pub fn points_inserted(&self) -> usize {
        self.sites.iter().map(|s| s.points_inserted).sum()
    }

    pub fn merge(&mut self, other: BackfillReport) {
        self.sites.extend(other.sites);
        self.sites.sort_by_key(|s| s.site_id);
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct BackfillOrchestrator {
    aggregator: Arc<DailyAggregator>,
    store: Arc<dyn PersistenceGateway>,
    config: BackfillConfig,
}

impl BackfillOrchestrator {
    pub fn new(
        aggregator: Arc<DailyAggregator>,
        store: Arc<dyn PersistenceGateway>,
        config: BackfillConfig,
    ) -> Self {
        Self {
            aggregator,
            store,
            config,
        }
    }

    /// Computes and persists every daily field for `site_ids` over `range`.
    /// An empty `site_ids` means every reef.
    pub fn backfill(
        &self,
        site_ids: &[i32],
        range: DateRange,
    ) -> Result<BackfillReport, StoreError> {
        self.run(site_ids, vec![range], None)
    }

    /// Narrow variant: recomputes only `metric`, leaving other fields as stored.
    pub fn backfill_metric(
        &self,
        site_ids: &[i32],
        range: DateRange,
        metric: Metric,
    ) -> Result<BackfillReport, StoreError> {
        self.run(site_ids, vec![range], Some(metric))
    }

    /// `backfill_metric` over whole years (see `DateRange::from_years`).
    pub fn backfill_metric_years(
        &self,
        site_ids: &[i32],
        ranges: Vec<DateRange>,
        metric: Metric,
    ) -> Result<BackfillReport, StoreError> {
        self.run(site_ids, ranges, Some(metric))
    }

    fn run(
        &self,
        site_ids: &[i32],
        mut ranges: Vec<DateRange>,
        metric: Option<Metric>,
    ) -> Result<BackfillReport, StoreError> {
        ranges.sort();
        let sites = self.store.find_sites(site_ids)?;
        for id in site_ids {
            if !sites.iter().any(|s| s.id == *id) {
                warn!(site_id = *id, "reef not found; skipping");
            }
        }
        if sites.is_empty() {
            warn!("no reefs to backfill");
            return Ok(BackfillReport::default());
        }

        let days: usize = ranges.iter().map(DateRange::len).sum();
        info!(
            reefs = sites.len(),
            days,
            metric = metric.map(|m| m.as_str()).unwrap_or("all"),
            concurrency = self.config.concurrency,
            "starting backfill"
        );

        let pool = ThreadPool::new(self.config.concurrency.max(1));
        let (tx, rx) = mpsc::channel();
        let expected: Vec<i32> = sites.iter().map(|s| s.id).collect();

        for site in sites {
            let tx = tx.clone();
            let aggregator = Arc::clone(&self.aggregator);
            let store = Arc::clone(&self.store);
            let ranges = ranges.clone();
            let batch_size = self.config.batch_size.max(1);
            pool.execute(move || {
                let report =
                    backfill_site(&aggregator, store.as_ref(), &site, &ranges, metric, batch_size);
                // The receiver outlives the pool; a send can only fail after a panic upstream.
                let _ = tx.send(report);
            });
        }
        drop(tx);

        let mut reports: Vec<SiteReport> = rx.iter().collect();
        for id in expected {
            if !reports.iter().any(|r| r.site_id == id) {
                error!(site_id = id, "reef worker panicked");
                reports.push(SiteReport::aborted(id, "worker panicked".to_string()));
            }
        }
        reports.sort_by_key(|r| r.site_id);
        let report = BackfillReport { sites: reports };

        let label = match metric {
            Some(m) => format!("Backfill of {}", m),
            None => "Backfill".to_string(),
        };
        log_backfill_summary(&label, report.sites.len(), report.succeeded(), report.failed());

        // Fire-and-forget: a failed refresh does not fail the run.
        if let Err(e) = self.store.refresh_latest_data() {
            warn!(error = %e, "latest data refresh failed");
        }

        Ok(report)
    }
}

/// Provenance ids for one reef: (model source, spotter source).
fn resolve_sources(
    store: &dyn PersistenceGateway,
    site: &Site,
) -> Result<(i32, Option<i32>), StoreError> {
    let model = store.ensure_source(site.id, SourceType::SofarApi, None)?;
    let spotter = match &site.spotter_id {
        Some(spotter_id) => {
            Some(store.ensure_source(site.id, SourceType::Spotter, Some(spotter_id))?.id)
        }
        None => None,
    };
    Ok((model.id, spotter))
}

/// One reef's share of a run: dates in ascending order, then batches.
fn backfill_site(
    aggregator: &DailyAggregator,
    store: &dyn PersistenceGateway,
    site: &Site,
    ranges: &[DateRange],
    metric: Option<Metric>,
    batch_size: usize,
) -> SiteReport {
    let mut report = SiteReport::new(site.id);
    let reef = site.label();
    let (model_source, spotter_source) = match resolve_sources(store, site) {
        Ok(ids) => ids,
        Err(e) => {
            error!(site_id = site.id, %reef, error = %e, "could not resolve sources");
            return SiteReport::aborted(site.id, e.to_string());
        }
    };

    let mut points: Vec<TimeSeriesPoint> = Vec::new();
    for date in ranges.iter().flat_map(|r| r.days()) {
        let computed = match metric {
            Some(m) => aggregator.get_metric_data(site, date, m),
            None => aggregator.get_daily_data(site, date),
        };
        let day = match computed {
            Ok(day) => day,
            Err(e) => {
                error!(site_id = site.id, %reef, %date, error = %e, "daily computation failed");
                report.days_failed += 1;
                continue;
            }
        };

        match store.upsert_daily_summary(&day.summary) {
            Ok(UpsertOutcome::Inserted) => report.days_inserted += 1,
            Ok(UpsertOutcome::Updated) => report.days_updated += 1,
            Err(e) => {
                error!(site_id = site.id, %reef, %date, error = %e, "daily summary upsert failed");
                report.days_failed += 1;
                continue;
            }
        }
        points.extend(day.time_series_points(site, model_source, spotter_source));

        if date.day() == 1 {
            debug!(site_id = site.id, %reef, %date, "backfill progress");
        }
    }

    let batches: Vec<&[TimeSeriesPoint]> = points.chunks(batch_size).collect();
    for (i, batch) in batches.iter().enumerate() {
        match store.insert_time_series_batch(batch) {
            Ok(inserted) => {
                report.points_inserted += inserted;
                info!(site_id = site.id, %reef, "saved {} out of {} batches", i + 1, batches.len());
            }
            Err(e) => {
                error!(
                    site_id = site.id,
                    %reef,
                    batch = i + 1,
                    error = %e,
                    "time-series batch failed"
                );
                report.batches_failed += 1;
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_range_is_inclusive() {
        let range = DateRange::new(d(2020, 2, 27), d(2020, 3, 1)).unwrap();
        let days: Vec<NaiveDate> = range.days().collect();
        assert_eq!(
            days,
            vec![d(2020, 2, 27), d(2020, 2, 28), d(2020, 2, 29), d(2020, 3, 1)]
        );
        assert_eq!(range.len(), 4);
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        assert_eq!(
            DateRange::new(d(2020, 3, 2), d(2020, 3, 1)),
            Err(DateRangeError::Inverted {
                start: d(2020, 3, 2),
                end: d(2020, 3, 1)
            })
        );
    }

    #[test]
    fn test_last_days_ends_yesterday() {
        let range = DateRange::last_days(d(2020, 7, 10), 3).unwrap();
        assert_eq!(range, DateRange::new(d(2020, 7, 7), d(2020, 7, 9)).unwrap());
    }

    #[test]
    fn test_years_expand_to_calendar_years_clamped_to_yesterday() {
        let ranges = DateRange::from_years(&[2020, 2019, 2020], d(2020, 7, 10)).unwrap();
        assert_eq!(
            ranges,
            vec![
                DateRange::new(d(2019, 1, 1), d(2019, 12, 31)).unwrap(),
                DateRange::new(d(2020, 1, 1), d(2020, 7, 9)).unwrap(),
            ]
        );
    }

    #[test]
    fn test_future_years_are_dropped() {
        assert!(DateRange::from_years(&[2030], d(2020, 7, 10)).is_err());
        let ranges = DateRange::from_years(&[2020, 2030], d(2020, 7, 10)).unwrap();
        assert_eq!(ranges.len(), 1);
    }

    #[test]
    fn test_site_report_success_requires_no_failures() {
        let mut report = SiteReport::new(1);
        assert!(report.succeeded());
        report.batches_failed = 1;
        assert!(!report.succeeded());
        assert!(!SiteReport::aborted(2, "boom".into()).succeeded());
    }
}

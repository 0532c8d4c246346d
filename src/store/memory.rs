/// In-process persistence gateway.
///
/// Mirrors the conflict rules of the database schema exactly, so the
/// orchestration code can be exercised end to end without PostgreSQL.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::{PersistenceGateway, StoreError, UpsertOutcome};
use crate::model::{
    DailySummary, ExclusionWindow, Metric, Site, Source, SourceType, TimeSeriesPoint,
};

type PointKey = (i32, i32, Metric, DateTime<Utc>);

#[derive(Default)]
struct MemoryState {
    sites: BTreeMap<i32, Site>,
    sources: Vec<Source>,
    exclusions: Vec<ExclusionWindow>,
    daily: BTreeMap<(i32, NaiveDate), DailySummary>,
    points: BTreeMap<PointKey, f64>,
    refreshes: usize,
}

#[derive(Default)]
pub struct MemoryGateway {
    state: Mutex<MemoryState>,
}

impl MemoryGateway {
    pub fn with_sites(sites: impl IntoIterator<Item = Site>) -> Self {
        let gateway = Self::default();
        if let Ok(mut state) = gateway.state.lock() {
            state.sites = sites.into_iter().map(|s| (s.id, s)).collect();
        }
        gateway
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Poisoned)
    }

    pub fn add_exclusion_window(&self, window: ExclusionWindow) -> Result<(), StoreError> {
        self.state()?.exclusions.push(window);
        Ok(())
    }

    pub fn daily_summary(
        &self,
        site_id: i32,
        date: NaiveDate,
    ) -> Result<Option<DailySummary>, StoreError> {
        Ok(self.state()?.daily.get(&(site_id, date)).cloned())
    }

    /// Every stored summary, ordered by (site, date).
    pub fn daily_summaries(&self) -> Result<Vec<DailySummary>, StoreError> {
        Ok(self.state()?.daily.values().cloned().collect())
    }

    /// Every stored point, ordered by (site, source, metric, timestamp).
    pub fn time_series(&self) -> Result<Vec<TimeSeriesPoint>, StoreError> {
        Ok(self
            .state()?
            .points
            .iter()
            .map(|(&(site_id, source_id, metric, timestamp), &value)| TimeSeriesPoint {
                site_id,
                source_id,
                metric,
                timestamp,
                value,
            })
            .collect())
    }

    pub fn sources(&self) -> Result<Vec<Source>, StoreError> {
        Ok(self.state()?.sources.clone())
    }

    pub fn refresh_count(&self) -> Result<usize, StoreError> {
        Ok(self.state()?.refreshes)
    }
}

impl PersistenceGateway for MemoryGateway {
    fn find_site(&self, site_id: i32) -> Result<Option<Site>, StoreError> {
        Ok(self.state()?.sites.get(&site_id).cloned())
    }

    fn find_sites(&self, site_ids: &[i32]) -> Result<Vec<Site>, StoreError> {
        let state = self.state()?;
        Ok(state
            .sites
            .values()
            .filter(|s| site_ids.is_empty() || site_ids.contains(&s.id))
            .cloned()
            .collect())
    }

    fn ensure_source(
        &self,
        site_id: i32,
        source_type: SourceType,
        spotter_id: Option<&str>,
    ) -> Result<Source, StoreError> {
        let mut state = self.state()?;
        let existing = state.sources.iter().find(|s| {
            s.site_id == site_id
                && s.source_type == source_type
                && s.spotter_id.as_deref() == spotter_id
        });
        if let Some(source) = existing {
            return Ok(source.clone());
        }

        let source = Source {
            id: state.sources.len() as i32 + 1,
            site_id,
            source_type,
            depth: None,
            spotter_id: spotter_id.map(str::to_string),
        };
        state.sources.push(source.clone());
        Ok(source)
    }

    fn find_exclusion_windows(
        &self,
        spotter_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ExclusionWindow>, StoreError> {
        Ok(self
            .state()?
            .exclusions
            .iter()
            .filter(|w| w.spotter_id == spotter_id && w.conflicts_with(start, end))
            .cloned()
            .collect())
    }

    fn satellite_temperature_history(
        &self,
        site_id: i32,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<(NaiveDate, f64)>, StoreError> {
        if start > end {
            return Ok(Vec::new());
        }
        Ok(self
            .state()?
            .daily
            .range((site_id, start)..=(site_id, end))
            .filter_map(|(&(_, date), summary)| summary.satellite_temperature.map(|t| (date, t)))
            .collect())
    }

    fn latest_daily_date(&self, site_id: i32) -> Result<Option<NaiveDate>, StoreError> {
        Ok(self
            .state()?
            .daily
            .keys()
            .filter(|(id, _)| *id == site_id)
            .map(|&(_, date)| date)
            .max())
    }

    fn upsert_daily_summary(&self, summary: &DailySummary) -> Result<UpsertOutcome, StoreError> {
        let mut state = self.state()?;
        match state.daily.entry((summary.site_id, summary.date)) {
            Entry::Occupied(mut existing) => {
                existing.get_mut().merge_non_null(summary);
                Ok(UpsertOutcome::Updated)
            }
            Entry::Vacant(slot) => {
                slot.insert(summary.clone());
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    fn insert_time_series_batch(&self, points: &[TimeSeriesPoint]) -> Result<usize, StoreError> {
        let mut state = self.state()?;
        let mut inserted = 0;
        for p in points {
            let key = (p.site_id, p.source_id, p.metric, p.timestamp);
            if !state.points.contains_key(&key) {
                state.points.insert(key, p.value);
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    fn refresh_latest_data(&self) -> Result<(), StoreError> {
        self.state()?.refreshes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 7, day).unwrap()
    }

    #[test]
    fn test_second_upsert_merges_instead_of_duplicating() {
        let gateway = MemoryGateway::default();
        let mut first = DailySummary::new(1, date(7));
        first.surface_temperature = Some(28.1);
        first.wind_direction = Some(90);
        assert_eq!(gateway.upsert_daily_summary(&first).unwrap(), UpsertOutcome::Inserted);

        let mut second = DailySummary::new(1, date(7));
        second.wind_direction = Some(120);
        assert_eq!(gateway.upsert_daily_summary(&second).unwrap(), UpsertOutcome::Updated);

        let stored = gateway.daily_summaries().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].surface_temperature, Some(28.1));
        assert_eq!(stored[0].wind_direction, Some(120));
    }

    #[test]
    fn test_duplicate_points_are_skipped() {
        let gateway = MemoryGateway::default();
        let point = TimeSeriesPoint {
            site_id: 1,
            source_id: 1,
            metric: Metric::WindSpeed,
            timestamp: Utc.with_ymd_and_hms(2020, 7, 7, 0, 0, 0).unwrap(),
            value: 4.0,
        };
        assert_eq!(gateway.insert_time_series_batch(&[point.clone(), point.clone()]).unwrap(), 1);
        assert_eq!(gateway.insert_time_series_batch(&[point]).unwrap(), 0);
        assert_eq!(gateway.time_series().unwrap().len(), 1);
    }

    #[test]
    fn test_ensure_source_is_find_or_create() {
        let gateway = MemoryGateway::default();
        let a = gateway.ensure_source(1, SourceType::SofarApi, None).unwrap();
        let b = gateway.ensure_source(1, SourceType::SofarApi, None).unwrap();
        let c = gateway.ensure_source(1, SourceType::Spotter, Some("SPOT-1")).unwrap();
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert_eq!(gateway.sources().unwrap().len(), 2);
    }

    #[test]
    fn test_satellite_history_is_bounded_and_skips_missing_days() {
        let gateway = MemoryGateway::default();
        for day in 1..=5 {
            let mut summary = DailySummary::new(1, date(day));
            summary.satellite_temperature = (day != 3).then_some(27.0 + day as f64);
            gateway.upsert_daily_summary(&summary).unwrap();
        }
        let history = gateway.satellite_temperature_history(1, date(2), date(4)).unwrap();
        assert_eq!(history, vec![(date(2), 29.0), (date(4), 31.0)]);
        assert_eq!(gateway.latest_daily_date(1).unwrap(), Some(date(5)));
        assert_eq!(gateway.latest_daily_date(2).unwrap(), None);
    }
}

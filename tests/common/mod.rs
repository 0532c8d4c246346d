//! Shared fixtures for the integration tests: a scripted provider, a
//! gateway wrapper with injected store failures, and reef builders.

#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use reefmon_service::ingest::{
    ProviderClient, ProviderError, SeriesKind, SeriesRequest, request_window,
};
use reefmon_service::model::{
    DailySummary, ExclusionWindow, SensorData, Site, SofarValue, Source, SourceType,
    TimeSeriesPoint,
};
use reefmon_service::store::{MemoryGateway, PersistenceGateway, StoreError, UpsertOutcome};

pub const REEF_TZ: &str = "Australia/Brisbane";

pub fn tz() -> Tz {
    REEF_TZ.parse().unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn reef(id: i32, spotter_id: Option<&str>) -> Site {
    Site {
        id,
        name: Some(format!("Reef {}", id)),
        longitude: 146.8,
        latitude: -18.3,
        time_zone: tz(),
        max_monthly_mean: Some(28.0),
        spotter_id: spotter_id.map(str::to_string),
        depth: Some(8.0),
    }
}

/// A sample at local `hour` of `day` in the reef zone.
pub fn local(day: NaiveDate, hour: u32, value: f64) -> SofarValue {
    let naive = day.and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap());
    let at = tz().from_local_datetime(&naive).unwrap();
    SofarValue::new(at.fixed_offset(), value)
}

/// One sample per listed local hour for every day in `start..=end`.
pub fn daily_samples(
    start: NaiveDate,
    end: NaiveDate,
    hours: &[u32],
    value: f64,
) -> Vec<SofarValue> {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .flat_map(|d| hours.iter().map(move |h| local(d, *h, value)))
        .collect()
}

fn within(series: &[SofarValue], start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<SofarValue> {
    series
        .iter()
        .filter(|v| v.utc() >= start && v.utc() <= end)
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// Scripted provider
// ---------------------------------------------------------------------------

/// Serves canned series keyed by variable name, filtered to the requested
/// window the way the real API does. Forecasts return everything.
#[derive(Default)]
pub struct ScriptedProvider {
    series: HashMap<&'static str, Vec<SofarValue>>,
    sensor: SensorData,
    failing: HashSet<&'static str>,
    sensor_failing: bool,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, variable: &'static str, values: Vec<SofarValue>) -> Self {
        self.series.entry(variable).or_default().extend(values);
        self
    }

    pub fn with_sensor(mut self, sensor: SensorData) -> Self {
        self.sensor = sensor;
        self
    }

    pub fn failing(mut self, variable: &'static str) -> Self {
        self.failing.insert(variable);
        self
    }

    pub fn sensor_failing(mut self) -> Self {
        self.sensor_failing = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ProviderClient for ScriptedProvider {
    fn fetch_series(&self, request: &SeriesRequest) -> Result<Vec<SofarValue>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let variable = request.source.variable;
        if self.failing.contains(variable) {
            return Err(ProviderError::Network(format!("{} timed out", variable)));
        }
        let series = self.series.get(variable).cloned().unwrap_or_default();
        Ok(match request.kind {
            SeriesKind::Forecast => series,
            SeriesKind::Hindcast => {
                let (start, end) = request.window();
                within(&series, start, end)
            }
        })
    }

    fn fetch_sensor_series(
        &self,
        _sensor_id: &str,
        time_zone: Tz,
        reference: DateTime<Utc>,
        lookback_hours: Option<u32>,
    ) -> Result<SensorData, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.sensor_failing {
            return Err(ProviderError::Rejected {
                status: 401,
                message: "invalid token".into(),
            });
        }
        let (start, end) = request_window(time_zone, reference, lookback_hours);
        let s = &self.sensor;
        Ok(SensorData {
            surface_temperature: within(&s.surface_temperature, start, end),
            bottom_temperature: within(&s.bottom_temperature, start, end),
            significant_wave_height: within(&s.significant_wave_height, start, end),
            wave_peak_period: within(&s.wave_peak_period, start, end),
            wave_mean_direction: within(&s.wave_mean_direction, start, end),
            latitude: within(&s.latitude, start, end),
            longitude: within(&s.longitude, start, end),
        })
    }
}

/// Every model variable the pipeline reads, twice a day (06:00 and 18:00
/// local) over `start..=end`.
pub fn full_model_provider(start: NaiveDate, end: NaiveDate) -> ScriptedProvider {
    let twice = |value| daily_samples(start, end, &[6, 18], value);
    ScriptedProvider::new()
        .with_series("HYCOM-seaSurfaceTemperature", twice(29.0))
        .with_series("analysedSeaSurfaceTemperature", twice(29.0))
        .with_series("degreeHeatingWeek", twice(2.0))
        .with_series("NOAAOperationalWaveModel-significantWaveHeight", twice(2.0))
        .with_series("NOAAOperationalWaveModel-meanDirectionWindWaves", twice(135.0))
        .with_series("NOAAOperationalWaveModel-peakPeriod", twice(9.0))
        .with_series("GFS-magnitude10MeterWind", twice(6.0))
        .with_series("GFS-direction10MeterWind", twice(120.0))
}

// ---------------------------------------------------------------------------
// Failing gateway
// ---------------------------------------------------------------------------

/// Delegates to a `MemoryGateway`, failing only the calls it was told to:
/// daily upserts for one reef, the nth time-series batch, or explicit
/// lookups that include one reef.
pub struct FailingGateway {
    pub inner: Arc<MemoryGateway>,
    failing_upserts_for: Option<i32>,
    failing_batch: Option<usize>,
    failing_lookups_of: Option<i32>,
    batch_calls: AtomicUsize,
}

impl FailingGateway {
    pub fn new(inner: Arc<MemoryGateway>) -> Self {
        Self {
            inner,
            failing_upserts_for: None,
            failing_batch: None,
            failing_lookups_of: None,
            batch_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_upserts_for(mut self, site_id: i32) -> Self {
        self.failing_upserts_for = Some(site_id);
        self
    }

    /// Fails the `n`th batch insert (1-based) across the gateway's lifetime.
    pub fn failing_batch(mut self, n: usize) -> Self {
        self.failing_batch = Some(n);
        self
    }

    pub fn failing_lookups_of(mut self, site_id: i32) -> Self {
        self.failing_lookups_of = Some(site_id);
        self
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }
}

fn connection_reset(table: &'static str) -> StoreError {
    StoreError::InvalidRow {
        table,
        reason: "connection reset".into(),
    }
}

impl PersistenceGateway for FailingGateway {
    fn find_site(&self, site_id: i32) -> Result<Option<Site>, StoreError> {
        self.inner.find_site(site_id)
    }

    fn find_sites(&self, site_ids: &[i32]) -> Result<Vec<Site>, StoreError> {
        if self.failing_lookups_of.is_some_and(|id| site_ids.contains(&id)) {
            return Err(connection_reset("sites"));
        }
        self.inner.find_sites(site_ids)
    }

    fn ensure_source(
        &self,
        site_id: i32,
        source_type: SourceType,
        spotter_id: Option<&str>,
    ) -> Result<Source, StoreError> {
        self.inner.ensure_source(site_id, source_type, spotter_id)
    }

    fn find_exclusion_windows(
        &self,
        spotter_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ExclusionWindow>, StoreError> {
        self.inner.find_exclusion_windows(spotter_id, start, end)
    }

    fn satellite_temperature_history(
        &self,
        site_id: i32,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<(NaiveDate, f64)>, StoreError> {
        self.inner.satellite_temperature_history(site_id, start, end)
    }

    fn latest_daily_date(&self, site_id: i32) -> Result<Option<NaiveDate>, StoreError> {
        self.inner.latest_daily_date(site_id)
    }

    fn upsert_daily_summary(&self, summary: &DailySummary) -> Result<UpsertOutcome, StoreError> {
        if self.failing_upserts_for == Some(summary.site_id) {
            return Err(connection_reset("daily_data"));
        }
        self.inner.upsert_daily_summary(summary)
    }

    fn insert_time_series_batch(&self, points: &[TimeSeriesPoint]) -> Result<usize, StoreError> {
        let call = self.batch_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing_batch == Some(call) {
            return Err(connection_reset("time_series"));
        }
        self.inner.insert_time_series_batch(points)
    }

    fn refresh_latest_data(&self) -> Result<(), StoreError> {
        self.inner.refresh_latest_data()
    }
}

pub fn approx(actual: Option<f64>, expected: f64) -> bool {
    actual.is_some_and(|a| (a - expected).abs() < 1e-9)
}

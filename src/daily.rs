/// Daily aggregation engine.
///
/// For one reef and one local calendar date, fetches every variable the
/// daily summary needs, prefers the reef's spotter over model data per
/// variable, reduces each series and derives degree heating days and the
/// alert level.
///
/// Fetches run in two concurrent phases on scoped threads:
///   1. spotter telemetry, satellite SST, wind speed, wind direction
///   2. model wave series for whatever the spotter did not report, and
///      degree heating (which needs the day's SST from phase 1)
///
/// Provider failures never fail the day; the variable is treated as "no
/// data". Store failures do, and are reported to the caller.

use chrono::{Days, NaiveDate};
use std::sync::Arc;
use std::thread::{self, ScopedJoinHandle};
use tracing::{debug, error};

use crate::alert::bleaching::classify;
use crate::analysis::degree_heating::{
    DAYS_PER_WEEK, DEGREE_HEATING_WINDOW_DAYS, DegreeHeating, DegreeHeatingBasis,
    resolve_degree_heating_days,
};
use crate::analysis::reducers::{
    closest_to, mean, min_max_mean, rounded_mean, sort_chronologically, values_of,
};
use crate::ingest::{
    CRW_DEGREE_HEATING_WEEK, GFS_WIND_DIRECTION, GFS_WIND_SPEED, HYCOM_SEA_SURFACE_TEMPERATURE,
    ModelVariable, ProviderClient, SeriesRequest, WAVE_MEAN_DIRECTION, WAVE_PEAK_PERIOD,
    WAVE_SIGNIFICANT_HEIGHT, day_window, local_midnight,
};
use crate::logging::log_provider_failure;
use crate::model::{
    DailySummary, ExclusionWindow, Metric, SensorData, Site, SofarValue, TimeSeriesPoint,
};
use crate::store::{PersistenceGateway, StoreError};

// ---------------------------------------------------------------------------
// Result of one (reef, date) computation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct DailyComputation {
    pub summary: DailySummary,
    /// Spotter series after exclusion filtering.
    pub sensor: SensorData,
    /// Metrics whose daily value came from a model or was derived.
    pub model_metrics: Vec<Metric>,
    pub degree_heating: Option<DegreeHeating>,
}

impl DailyComputation {
    fn new(site_id: i32, date: NaiveDate) -> Self {
        Self {
            summary: DailySummary::new(site_id, date),
            sensor: SensorData::default(),
            model_metrics: Vec::new(),
            degree_heating: None,
        }
    }

    fn record_model(&mut self, metric: Metric) {
        if self.summary.value_for(metric).is_some() && !self.model_metrics.contains(&metric) {
            self.model_metrics.push(metric);
        }
    }

    /// Time-series rows for this day: raw spotter samples under the spotter
    /// source, and one value per model metric under the model source,
    /// stamped at local midnight of the date.
    pub fn time_series_points(
        &self,
        site: &Site,
        model_source_id: i32,
        spotter_source_id: Option<i32>,
    ) -> Vec<TimeSeriesPoint> {
        let mut points = Vec::new();

        if let Some(source_id) = spotter_source_id {
            let sensor_series: [(Metric, &Vec<SofarValue>); 5] = [
                (Metric::BottomTemperature, &self.sensor.bottom_temperature),
                (Metric::TopTemperature, &self.sensor.surface_temperature),
                (Metric::SignificantWaveHeight, &self.sensor.significant_wave_height),
                (Metric::WavePeakPeriod, &self.sensor.wave_peak_period),
                (Metric::WaveMeanDirection, &self.sensor.wave_mean_direction),
            ];
            for (metric, series) in sensor_series {
                points.extend(series.iter().map(|v| TimeSeriesPoint {
                    site_id: site.id,
                    source_id,
                    metric,
                    timestamp: v.utc(),
                    value: v.value,
                }));
            }
        }

        let midnight = local_midnight(site.time_zone, self.summary.date);
        for &metric in &self.model_metrics {
            if let Some(value) = self.summary.value_for(metric) {
                points.push(TimeSeriesPoint {
                    site_id: site.id,
                    source_id: model_source_id,
                    metric,
                    timestamp: midnight,
                    value,
                });
            }
        }
        points
    }
}

/// A wave variable after the spotter-or-model decision.
#[derive(Debug, Default)]
struct ChosenSeries {
    values: Vec<f64>,
    from_model: bool,
}

// ---------------------------------------------------------------------------
// Shared helpers (also used by the live assembler)
// ---------------------------------------------------------------------------

/// Runs a provider fetch, logging failures and degrading them to "no data".
pub(crate) fn fetch_or_empty(
    provider: &dyn ProviderClient,
    site_id: i32,
    operation: &str,
    request: &SeriesRequest,
) -> Vec<SofarValue> {
    match provider.fetch_series(request) {
        Ok(mut values) => {
            sort_chronologically(&mut values);
            values
        }
        Err(e) => {
            log_provider_failure(site_id, operation, &e);
            Vec::new()
        }
    }
}

/// Joins a scoped fetch thread; a panic is logged and yields `None`.
pub(crate) fn joined<T>(handle: ScopedJoinHandle<'_, T>, site_id: i32, what: &str) -> Option<T> {
    match handle.join() {
        Ok(value) => Some(value),
        Err(_) => {
            error!(site_id, what, "fetch thread panicked; treating as no data");
            None
        }
    }
}

/// Degree heating for `date`: stored daily SST of the 83 preceding days
/// plus `today_sst` form the 84-day window; `latest_dhw` is consulted only
/// when that window is incomplete.
pub(crate) fn degree_heating_for<F>(
    store: &dyn PersistenceGateway,
    site: &Site,
    date: NaiveDate,
    today_sst: Option<f64>,
    latest_dhw: F,
) -> Result<DegreeHeating, StoreError>
where
    F: FnOnce() -> Option<f64>,
{
    let preceding = (DEGREE_HEATING_WINDOW_DAYS - 1) as u64;
    let start = date.checked_sub_days(Days::new(preceding)).unwrap_or(NaiveDate::MIN);
    let end = date.checked_sub_days(Days::new(1)).unwrap_or(NaiveDate::MIN);

    let mut ssts: Vec<f64> = store
        .satellite_temperature_history(site.id, start, end)?
        .into_iter()
        .map(|(_, sst)| sst)
        .collect();
    ssts.extend(today_sst);

    Ok(resolve_degree_heating_days(&ssts, site.max_monthly_mean, latest_dhw))
}

/// Alert level from the day's SST and degree heating. Unknown degree
/// heating counts as no accumulated stress.
pub(crate) fn alert_level_for(
    site: &Site,
    sst: Option<f64>,
    degree_heating: &DegreeHeating,
) -> Option<i16> {
    let weeks = degree_heating.known_days().map(|days| days / DAYS_PER_WEEK);
    classify(site.max_monthly_mean, sst, weeks).map(|level| level.as_number())
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct DailyAggregator {
    provider: Arc<dyn ProviderClient>,
    store: Arc<dyn PersistenceGateway>,
}

impl DailyAggregator {
    pub fn new(provider: Arc<dyn ProviderClient>, store: Arc<dyn PersistenceGateway>) -> Self {
        Self { provider, store }
    }

    /// Full daily summary for `site` on local date `date`.
    pub fn get_daily_data(
        &self,
        site: &Site,
        date: NaiveDate,
    ) -> Result<DailyComputation, StoreError> {
        let exclusions = self.exclusion_windows(site, date)?;

        let (sensor, satellite, wind_speed, wind_direction) = thread::scope(|s| {
            let sensor = s.spawn(|| self.sensor_series(site, date, &exclusions));
            let satellite = s.spawn(|| self.model_day(site, date, HYCOM_SEA_SURFACE_TEMPERATURE));
            let wind_speed = s.spawn(|| self.model_day(site, date, GFS_WIND_SPEED));
            let wind_direction = s.spawn(|| self.model_day(site, date, GFS_WIND_DIRECTION));
            (
                joined(sensor, site.id, "spotter data").unwrap_or_default(),
                joined(satellite, site.id, "satellite temperature").unwrap_or_default(),
                joined(wind_speed, site.id, "wind speed").unwrap_or_default(),
                joined(wind_direction, site.id, "wind direction").unwrap_or_default(),
            )
        });
        let satellite_temperature = self.end_of_day_value(site, date, &satellite);

        let (heights, directions, periods, degree_heating) = thread::scope(|s| {
            let heights = s.spawn(|| {
                self.sensor_or_model(
                    site,
                    date,
                    &sensor.significant_wave_height,
                    WAVE_SIGNIFICANT_HEIGHT,
                )
            });
            let directions = s.spawn(|| {
                self.sensor_or_model(site, date, &sensor.wave_mean_direction, WAVE_MEAN_DIRECTION)
            });
            let periods = s.spawn(|| {
                self.sensor_or_model(site, date, &sensor.wave_peak_period, WAVE_PEAK_PERIOD)
            });
            let degree_heating =
                s.spawn(|| self.degree_heating(site, date, satellite_temperature));
            (
                joined(heights, site.id, "wave height").unwrap_or_default(),
                joined(directions, site.id, "wave direction").unwrap_or_default(),
                joined(periods, site.id, "wave period").unwrap_or_default(),
                joined(degree_heating, site.id, "degree heating"),
            )
        });
        let degree_heating = match degree_heating {
            Some(result) => result?,
            None => DegreeHeating {
                days: 0.0,
                basis: DegreeHeatingBasis::NoData,
            },
        };

        let mut out = DailyComputation::new(site.id, date);
        let summary = &mut out.summary;

        let bottom = values_of(&sensor.bottom_temperature);
        (
            summary.min_bottom_temperature,
            summary.max_bottom_temperature,
            summary.avg_bottom_temperature,
        ) = min_max_mean(&bottom);
        summary.surface_temperature = mean(&values_of(&sensor.surface_temperature), false);

        summary.satellite_temperature = satellite_temperature;
        summary.degree_heating_days = Some(degree_heating.days);
        summary.daily_alert_level = alert_level_for(site, satellite_temperature, &degree_heating);

        (summary.min_wave_height, summary.max_wave_height, summary.avg_wave_height) =
            min_max_mean(&heights.values);
        summary.wave_direction = rounded_mean(&directions.values);
        summary.wave_period = rounded_mean(&periods.values);

        let speeds = values_of(&wind_speed);
        (summary.min_wind_speed, summary.max_wind_speed, summary.avg_wind_speed) =
            min_max_mean(&speeds);
        summary.wind_direction = rounded_mean(&values_of(&wind_direction));

        out.record_model(Metric::SatelliteTemperature);
        if degree_heating.basis != DegreeHeatingBasis::NoData {
            out.record_model(Metric::DegreeHeatingDays);
        }
        out.record_model(Metric::Alert);
        out.record_model(Metric::WindSpeed);
        out.record_model(Metric::WindDirection);
        if heights.from_model {
            out.record_model(Metric::SignificantWaveHeight);
        }
        if directions.from_model {
            out.record_model(Metric::WaveMeanDirection);
        }
        if periods.from_model {
            out.record_model(Metric::WavePeakPeriod);
        }

        out.sensor = sensor;
        out.degree_heating = Some(degree_heating);
        debug!(site_id = site.id, %date, "daily data computed");
        Ok(out)
    }

    /// Narrow variant: computes only the fields behind `metric`, leaving every
    /// other field null so an upsert does not touch them.
    pub fn get_metric_data(
        &self,
        site: &Site,
        date: NaiveDate,
        metric: Metric,
    ) -> Result<DailyComputation, StoreError> {
        let mut out = DailyComputation::new(site.id, date);

        match metric {
            Metric::BottomTemperature | Metric::TopTemperature => {
                let exclusions = self.exclusion_windows(site, date)?;
                let sensor = self.sensor_series(site, date, &exclusions);
                if metric == Metric::BottomTemperature {
                    let bottom = values_of(&sensor.bottom_temperature);
                    (
                        out.summary.min_bottom_temperature,
                        out.summary.max_bottom_temperature,
                        out.summary.avg_bottom_temperature,
                    ) = min_max_mean(&bottom);
                    out.sensor.bottom_temperature = sensor.bottom_temperature;
                } else {
                    out.summary.surface_temperature =
                        mean(&values_of(&sensor.surface_temperature), false);
                    out.sensor.surface_temperature = sensor.surface_temperature;
                }
            }
            Metric::SatelliteTemperature => {
                let satellite = self.model_day(site, date, HYCOM_SEA_SURFACE_TEMPERATURE);
                out.summary.satellite_temperature = self.end_of_day_value(site, date, &satellite);
                out.record_model(metric);
            }
            Metric::DegreeHeatingDays | Metric::Alert => {
                let satellite = self.model_day(site, date, HYCOM_SEA_SURFACE_TEMPERATURE);
                let sst = self.end_of_day_value(site, date, &satellite);
                let degree_heating = self.degree_heating(site, date, sst)?;
                if metric == Metric::DegreeHeatingDays {
                    out.summary.degree_heating_days = Some(degree_heating.days);
                    if degree_heating.basis != DegreeHeatingBasis::NoData {
                        out.record_model(metric);
                    }
                } else {
                    out.summary.daily_alert_level = alert_level_for(site, sst, &degree_heating);
                    out.record_model(metric);
                }
                out.degree_heating = Some(degree_heating);
            }
            Metric::SignificantWaveHeight | Metric::WavePeakPeriod | Metric::WaveMeanDirection => {
                let exclusions = self.exclusion_windows(site, date)?;
                let mut sensor = self.sensor_series(site, date, &exclusions);
                let (series, model) = match metric {
                    Metric::SignificantWaveHeight => (
                        std::mem::take(&mut sensor.significant_wave_height),
                        WAVE_SIGNIFICANT_HEIGHT,
                    ),
                    Metric::WavePeakPeriod => {
                        (std::mem::take(&mut sensor.wave_peak_period), WAVE_PEAK_PERIOD)
                    }
                    _ => (std::mem::take(&mut sensor.wave_mean_direction), WAVE_MEAN_DIRECTION),
                };
                let chosen = self.sensor_or_model(site, date, &series, model);
                match metric {
                    Metric::SignificantWaveHeight => {
                        (
                            out.summary.min_wave_height,
                            out.summary.max_wave_height,
                            out.summary.avg_wave_height,
                        ) = min_max_mean(&chosen.values);
                        out.sensor.significant_wave_height = series;
                    }
                    Metric::WavePeakPeriod => {
                        out.summary.wave_period = rounded_mean(&chosen.values);
                        out.sensor.wave_peak_period = series;
                    }
                    _ => {
                        out.summary.wave_direction = rounded_mean(&chosen.values);
                        out.sensor.wave_mean_direction = series;
                    }
                }
                if chosen.from_model {
                    out.record_model(metric);
                }
            }
            Metric::WindSpeed => {
                let speeds = values_of(&self.model_day(site, date, GFS_WIND_SPEED));
                (
                    out.summary.min_wind_speed,
                    out.summary.max_wind_speed,
                    out.summary.avg_wind_speed,
                ) = min_max_mean(&speeds);
                out.record_model(metric);
            }
            Metric::WindDirection => {
                let directions = self.model_day(site, date, GFS_WIND_DIRECTION);
                out.summary.wind_direction = rounded_mean(&values_of(&directions));
                out.record_model(metric);
            }
        }

        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Building blocks
    // -----------------------------------------------------------------------

    fn exclusion_windows(
        &self,
        site: &Site,
        date: NaiveDate,
    ) -> Result<Vec<ExclusionWindow>, StoreError> {
        let Some(spotter_id) = &site.spotter_id else {
            return Ok(Vec::new());
        };
        let (start, end) = day_window(site.time_zone, date);
        self.store.find_exclusion_windows(spotter_id, start, end)
    }

    /// Spotter series for the day with excluded samples removed. Empty when
    /// the reef has no spotter or the call fails.
    fn sensor_series(
        &self,
        site: &Site,
        date: NaiveDate,
        exclusions: &[ExclusionWindow],
    ) -> SensorData {
        let Some(spotter_id) = &site.spotter_id else {
            return SensorData::default();
        };
        let (start, _) = day_window(site.time_zone, date);
        match self.provider.fetch_sensor_series(spotter_id, site.time_zone, start, None) {
            Ok(mut data) => {
                data.exclude(exclusions);
                data
            }
            Err(e) => {
                log_provider_failure(site.id, "spotter data", &e);
                SensorData::default()
            }
        }
    }

    fn model_day(&self, site: &Site, date: NaiveDate, source: ModelVariable) -> Vec<SofarValue> {
        let request =
            SeriesRequest::for_day(source, site.latitude, site.longitude, site.time_zone, date);
        fetch_or_empty(self.provider.as_ref(), site.id, source.variable, &request)
    }

    /// The spotter series when it has at least one sample, else the model's.
    fn sensor_or_model(
        &self,
        site: &Site,
        date: NaiveDate,
        sensor: &[SofarValue],
        model: ModelVariable,
    ) -> ChosenSeries {
        if !sensor.is_empty() {
            return ChosenSeries {
                values: values_of(sensor),
                from_model: false,
            };
        }
        ChosenSeries {
            values: values_of(&self.model_day(site, date, model)),
            from_model: true,
        }
    }

    /// The sample closest to the end of the local day.
    fn end_of_day_value(&self, site: &Site, date: NaiveDate, series: &[SofarValue]) -> Option<f64> {
        let (_, end_of_day) = day_window(site.time_zone, date);
        closest_to(series, &end_of_day).map(|v| v.value)
    }

    fn degree_heating(
        &self,
        site: &Site,
        date: NaiveDate,
        today_sst: Option<f64>,
    ) -> Result<DegreeHeating, StoreError> {
        degree_heating_for(self.store.as_ref(), site, date, today_sst, || {
            let dhw = self.model_day(site, date, CRW_DEGREE_HEATING_WEEK);
            self.end_of_day_value(site, date, &dhw)
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

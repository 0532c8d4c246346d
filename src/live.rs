/// Live conditions for one reef.
///
/// The low-latency sibling of the daily aggregation engine: instead of
/// reducing a full day, each variable is the sample closest to "now",
/// rejected when it is older than that source's refresh tolerance. The
/// spotter wins over the models wherever it reports.
///
/// Degree heating and the alert level are computed for the reef's local
/// "today" with the same calculators as the daily summary.

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::thread;
use thiserror::Error;
use tracing::{debug, warn};

use crate::analysis::degree_heating::{
    DegreeHeating, DegreeHeatingBasis, resolve_degree_heating_days,
};
use crate::analysis::reducers::{closest_to, closest_within_tolerance};
use crate::config::LiveConfig;
use crate::daily::{alert_level_for, degree_heating_for, fetch_or_empty, joined};
use crate::ingest::{
    CRW_DEGREE_HEATING_WEEK, CRW_SEA_SURFACE_TEMPERATURE, GFS_WIND_DIRECTION, GFS_WIND_SPEED,
    HYCOM_SEA_SURFACE_TEMPERATURE, ModelVariable, ProviderClient, SeriesKind, SeriesRequest,
    WAVE_MEAN_DIRECTION, WAVE_PEAK_PERIOD, WAVE_SIGNIFICANT_HEIGHT, request_window,
};
use crate::logging::log_provider_failure;
use crate::model::{SensorData, Site, SofarValue};
use crate::store::{PersistenceGateway, StoreError};

#[derive(Debug, Error)]
pub enum LiveDataError {
    #[error("reef {0} not found")]
    SiteNotFound(i32),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One reported value and when it was observed, in the reef's local offset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LiveValue {
    pub value: f64,
    pub timestamp: DateTime<FixedOffset>,
}

impl From<&SofarValue> for LiveValue {
    fn from(v: &SofarValue) -> Self {
        Self {
            value: v.value,
            timestamp: v.timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpotterPosition {
    pub latitude: LiveValue,
    pub longitude: LiveValue,
}

/// Current snapshot. Fields that could not be determined are omitted when
/// serialized; the alert level is always present and `null` when unknown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveData {
    pub site_id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degree_heating_days: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub satellite_temperature: Option<LiveValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surface_temperature: Option<LiveValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bottom_temperature: Option<LiveValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wave_height: Option<LiveValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wave_direction: Option<LiveValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wave_period: Option<LiveValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_speed: Option<LiveValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_direction: Option<LiveValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spotter_position: Option<SpotterPosition>,
    pub daily_alert_level: Option<i16>,
}

impl LiveData {
    fn empty(site_id: i32) -> Self {
        Self {
            site_id,
            degree_heating_days: None,
            satellite_temperature: None,
            surface_temperature: None,
            bottom_temperature: None,
            wave_height: None,
            wave_direction: None,
            wave_period: None,
            wind_speed: None,
            wind_direction: None,
            spotter_position: None,
            daily_alert_level: None,
        }
    }
}

fn lookback(hours: f64) -> u32 {
    hours.max(0.0).ceil() as u32
}

pub struct LiveDataAssembler {
    provider: Arc<dyn ProviderClient>,
    store: Arc<dyn PersistenceGateway>,
    config: LiveConfig,
}

impl LiveDataAssembler {
    pub fn new(
        provider: Arc<dyn ProviderClient>,
        store: Arc<dyn PersistenceGateway>,
        config: LiveConfig,
    ) -> Self {
        Self {
            provider,
            store,
            config,
        }
    }

    pub fn get_live_data(&self, site_id: i32) -> Result<LiveData, LiveDataError> {
        let site = self.store.find_site(site_id)?.ok_or(LiveDataError::SiteNotFound(site_id))?;
        Ok(self.get_live_data_at(&site, Utc::now()))
    }

    /// Snapshot of `site` as of `now`. Never fails: anything that cannot be
    /// fetched or computed is left out.
    pub fn get_live_data_at(&self, site: &Site, now: DateTime<Utc>) -> LiveData {
        let cfg = &self.config;
        let fetched = thread::scope(|s| {
            let sensor = s.spawn(|| self.sensor(site, now));
            let satellite = s.spawn(|| {
                self.hindcast(site, now, CRW_SEA_SURFACE_TEMPERATURE, cfg.satellite_tolerance_hours)
            });
            let history_basis = s.spawn(|| {
                let hours = cfg.satellite_tolerance_hours;
                self.hindcast(site, now, HYCOM_SEA_SURFACE_TEMPERATURE, hours)
            });
            let dhw = s.spawn(|| {
                let hours = cfg.degree_heating_tolerance_hours;
                self.hindcast(site, now, CRW_DEGREE_HEATING_WEEK, hours)
            });
            let heights = s.spawn(|| self.forecast(site, now, WAVE_SIGNIFICANT_HEIGHT));
            let directions = s.spawn(|| self.forecast(site, now, WAVE_MEAN_DIRECTION));
            let periods = s.spawn(|| self.forecast(site, now, WAVE_PEAK_PERIOD));
            let speeds = s.spawn(|| self.forecast(site, now, GFS_WIND_SPEED));
            let wind_directions = s.spawn(|| self.forecast(site, now, GFS_WIND_DIRECTION));
            LiveSeries {
                sensor: joined(sensor, site.id, "spotter data").unwrap_or_default(),
                satellite: joined(satellite, site.id, "satellite temperature").unwrap_or_default(),
                history_basis: joined(history_basis, site.id, "sea surface temperature")
                    .unwrap_or_default(),
                dhw: joined(dhw, site.id, "degree heating week").unwrap_or_default(),
                heights: joined(heights, site.id, "wave height").unwrap_or_default(),
                directions: joined(directions, site.id, "wave direction").unwrap_or_default(),
                periods: joined(periods, site.id, "wave period").unwrap_or_default(),
                speeds: joined(speeds, site.id, "wind speed").unwrap_or_default(),
                wind_directions: joined(wind_directions, site.id, "wind direction")
                    .unwrap_or_default(),
            }
        });

        let nearest = |series: &[SofarValue], hours: f64| {
            closest_within_tolerance(series, &now, hours).map(LiveValue::from)
        };
        let spotter_or_model = |spotter: &[SofarValue], model: &[SofarValue]| {
            nearest(spotter, cfg.sensor_tolerance_hours)
                .or_else(|| nearest(model, cfg.wave_tolerance_hours))
        };

        let sensor = &fetched.sensor;
        let mut live = LiveData::empty(site.id);
        live.satellite_temperature = nearest(&fetched.satellite, cfg.satellite_tolerance_hours);
        live.surface_temperature = nearest(&sensor.surface_temperature, cfg.sensor_tolerance_hours);
        live.bottom_temperature = nearest(&sensor.bottom_temperature, cfg.sensor_tolerance_hours);
        live.wave_height = spotter_or_model(&sensor.significant_wave_height, &fetched.heights);
        live.wave_direction = spotter_or_model(&sensor.wave_mean_direction, &fetched.directions);
        live.wave_period = spotter_or_model(&sensor.wave_peak_period, &fetched.periods);
        live.wind_speed = nearest(&fetched.speeds, cfg.wind_tolerance_hours);
        live.wind_direction = nearest(&fetched.wind_directions, cfg.wind_tolerance_hours);
        live.spotter_position = spotter_position(sensor);

        // Today's window point comes from the same model as the stored history.
        let today_sst =
            nearest(&fetched.history_basis, cfg.satellite_tolerance_hours).map(|v| v.value);
        let latest_dhw =
            nearest(&fetched.dhw, cfg.degree_heating_tolerance_hours).map(|v| v.value);
        let degree_heating = self.degree_heating(site, now, today_sst, latest_dhw);
        if degree_heating.basis != DegreeHeatingBasis::NoData {
            live.degree_heating_days = Some(degree_heating.days);
        }
        let sst = live.satellite_temperature.map(|v| v.value);
        live.daily_alert_level = alert_level_for(site, sst, &degree_heating);

        debug!(site_id = site.id, "live data assembled");
        live
    }

    fn degree_heating(
        &self,
        site: &Site,
        now: DateTime<Utc>,
        sst: Option<f64>,
        latest_dhw: Option<f64>,
    ) -> DegreeHeating {
        let today = now.with_timezone(&site.time_zone).date_naive();
        match degree_heating_for(self.store.as_ref(), site, today, sst, || latest_dhw) {
            Ok(dh) => dh,
            Err(e) => {
                warn!(
                    site_id = site.id,
                    error = %e,
                    "could not read temperature history; using provider weeks"
                );
                resolve_degree_heating_days(&[], site.max_monthly_mean, || latest_dhw)
            }
        }
    }

    fn sensor(&self, site: &Site, now: DateTime<Utc>) -> SensorData {
        let Some(spotter_id) = &site.spotter_id else {
            return SensorData::default();
        };
        let hours = lookback(self.config.sensor_tolerance_hours);
        let fetched =
            self.provider.fetch_sensor_series(spotter_id, site.time_zone, now, Some(hours));
        let mut data = match fetched {
            Ok(data) => data,
            Err(e) => {
                log_provider_failure(site.id, "spotter data", &e);
                return SensorData::default();
            }
        };

        let (start, end) = request_window(site.time_zone, now, Some(hours));
        match self.store.find_exclusion_windows(spotter_id, start, end) {
            Ok(windows) => data.exclude(&windows),
            Err(e) => {
                // Unfiltered spotter data could be a deployment artefact.
                warn!(
                    site_id = site.id,
                    error = %e,
                    "could not read exclusion windows; ignoring spotter data"
                );
                return SensorData::default();
            }
        }
        data
    }

    fn hindcast(
        &self,
        site: &Site,
        now: DateTime<Utc>,
        source: ModelVariable,
        tolerance_hours: f64,
    ) -> Vec<SofarValue> {
        let request = SeriesRequest {
            source,
            kind: SeriesKind::Hindcast,
            latitude: site.latitude,
            longitude: site.longitude,
            time_zone: site.time_zone,
            reference: now,
            lookback_hours: Some(lookback(tolerance_hours)),
        };
        fetch_or_empty(self.provider.as_ref(), site.id, source.variable, &request)
    }

    fn forecast(&self, site: &Site, now: DateTime<Utc>, source: ModelVariable) -> Vec<SofarValue> {
        let request = SeriesRequest {
            source,
            kind: SeriesKind::Forecast,
            latitude: site.latitude,
            longitude: site.longitude,
            time_zone: site.time_zone,
            reference: now,
            lookback_hours: None,
        };
        fetch_or_empty(self.provider.as_ref(), site.id, source.variable, &request)
    }
}

/// Everything one snapshot fetches, joined from the scoped workers.
struct LiveSeries {
    sensor: SensorData,
    satellite: Vec<SofarValue>,
    /// HYCOM SST, the series stored daily summaries are built from.
    history_basis: Vec<SofarValue>,
    dhw: Vec<SofarValue>,
    heights: Vec<SofarValue>,
    directions: Vec<SofarValue>,
    periods: Vec<SofarValue>,
    speeds: Vec<SofarValue>,
    wind_directions: Vec<SofarValue>,
}

/// Latest reported buoy position, unreduced.
fn spotter_position(sensor: &SensorData) -> Option<SpotterPosition> {
    let latitude = sensor.latitude.last()?;
    let longitude = closest_to(&sensor.longitude, &latitude.timestamp)?;
    Some(SpotterPosition {
        latitude: latitude.into(),
        longitude: longitude.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::ProviderError;
    use crate::store::MemoryGateway;
    use chrono::{TimeDelta, TimeZone};
    use chrono_tz::Tz;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 7, 7, 12, 0, 0).unwrap()
    }

    fn at(hours_ago: i64, value: f64) -> SofarValue {
        SofarValue::new((now() - TimeDelta::hours(hours_ago)).fixed_offset(), value)
    }

    /// Model samples `age` hours old; the spotter reports wave height only.
    struct AgedProvider {
        model_age: i64,
    }

    impl ProviderClient for AgedProvider {
        fn fetch_series(&self, request: &SeriesRequest) -> Result<Vec<SofarValue>, ProviderError> {
            let value = match request.source.variable {
                "analysedSeaSurfaceTemperature" => 29.2,
                "degreeHeatingWeek" => 2.0,
                "NOAAOperationalWaveModel-significantWaveHeight" => 1.8,
                _ => 3.0,
            };
            Ok(vec![at(self.model_age, value)])
        }

        fn fetch_sensor_series(
            &self,
            _: &str,
            _: Tz,
            _: DateTime<Utc>,
            _: Option<u32>,
        ) -> Result<SensorData, ProviderError> {
            Ok(SensorData {
                significant_wave_height: vec![at(2, 0.9), at(1, 1.1)],
                latitude: vec![at(1, -17.5)],
                longitude: vec![at(1, 178.1)],
                ..SensorData::default()
            })
        }
    }

    fn reef(spotter: bool) -> Site {
        Site {
            id: 3,
            name: None,
            longitude: 178.0,
            latitude: -17.5,
            time_zone: "Pacific/Fiji".parse().unwrap(),
            max_monthly_mean: Some(28.0),
            spotter_id: spotter.then(|| "SPOT-0001".to_string()),
            depth: None,
        }
    }

    fn assembler(model_age: i64) -> LiveDataAssembler {
        LiveDataAssembler::new(
            Arc::new(AgedProvider { model_age }),
            Arc::new(MemoryGateway::default()),
            LiveConfig::default(),
        )
    }

    #[test]
    fn test_spotter_overrides_model_waves() {
        let live = assembler(1).get_live_data_at(&reef(true), now());
        assert_eq!(live.wave_height.map(|v| v.value), Some(1.1));
        assert_eq!(live.wave_period.map(|v| v.value), Some(3.0));
        let position = live.spotter_position.unwrap();
        assert_eq!(position.latitude.value, -17.5);
        assert_eq!(position.longitude.value, 178.1);
    }

    #[test]
    fn test_model_waves_used_without_spotter() {
        let live = assembler(1).get_live_data_at(&reef(false), now());
        assert_eq!(live.wave_height.map(|v| v.value), Some(1.8));
        assert!(live.spotter_position.is_none());
    }

    #[test]
    fn test_stale_samples_are_rejected_per_source() {
        // 10 hours old: too old for waves and wind, fresh enough for satellite.
        let live = assembler(10).get_live_data_at(&reef(false), now());
        assert!(live.wave_height.is_none());
        assert!(live.wind_speed.is_none());
        assert_eq!(live.satellite_temperature.map(|v| v.value), Some(29.2));
        // Short history falls back to provider weeks: 2 DHW is 14 DHD.
        assert_eq!(live.degree_heating_days, Some(14.0));
        assert_eq!(live.daily_alert_level, Some(2));
    }

    #[test]
    fn test_unknown_fields_are_omitted_and_alert_is_null() {
        let live = LiveData::empty(9);
        let json = serde_json::to_value(&live).unwrap();
        assert_eq!(json, serde_json::json!({ "site_id": 9, "daily_alert_level": null }));
    }
}

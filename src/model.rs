/// Core data types for the reef monitoring service.
///
/// This module defines the shared domain model imported by all other modules:
/// reefs, provenance sources, exclusion windows, time-series points and the
/// per-day summary record. It contains no I/O.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel used by the Sofar APIs for "no value".
pub const NO_DATA_SENTINEL: f64 = 9999.0;

// ---------------------------------------------------------------------------
// Reefs
// ---------------------------------------------------------------------------

/// A monitored reef site. Registered externally; read-only here.
#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    pub id: i32,
    pub name: Option<String>,
    pub longitude: f64,
    pub latitude: f64,
    pub time_zone: Tz,
    /// Historical Maximum Monthly Mean sea surface temperature (°C).
    pub max_monthly_mean: Option<f64>,
    /// Attached in-situ spotter buoy, if any.
    pub spotter_id: Option<String>,
    /// Sensor depth in metres.
    pub depth: Option<f64>,
}

impl Site {
    /// Human-readable label for log lines.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("{} ({})", name, self.id),
            None => format!("reef {}", self.id),
        }
    }
}

// ---------------------------------------------------------------------------
// Provenance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Sofar spotter buoy attached to the reef.
    Spotter,
    /// Logger deployed at a specific depth.
    Hobo,
    /// Remote model / satellite data served through the Sofar API.
    SofarApi,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Spotter => "spotter",
            SourceType::Hobo => "hobo",
            SourceType::SofarApi => "sofar_api",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "spotter" => Some(SourceType::Spotter),
            "hobo" => Some(SourceType::Hobo),
            "sofar_api" => Some(SourceType::SofarApi),
            _ => None,
        }
    }
}

/// Provenance row for time-series points. Historical sources persist.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub id: i32,
    pub site_id: i32,
    pub source_type: SourceType,
    pub depth: Option<f64>,
    pub spotter_id: Option<String>,
}

/// A period during which a spotter's readings are known-bad.
///
/// A missing start means "since the beginning of the record".
#[derive(Debug, Clone, PartialEq)]
pub struct ExclusionWindow {
    pub spotter_id: String,
    pub start: Option<DateTime<Utc>>,
    pub end: DateTime<Utc>,
}

impl ExclusionWindow {
    /// Overlap test against a query range `[start, end]`.
    pub fn conflicts_with(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.end >= start && self.start.is_none_or(|s| s <= end)
    }

    /// True when `timestamp` falls inside the window (bounds inclusive).
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp <= self.end && self.start.is_none_or(|s| s <= timestamp)
    }
}

// ---------------------------------------------------------------------------
// Metrics and readings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    BottomTemperature,
    TopTemperature,
    SatelliteTemperature,
    DegreeHeatingDays,
    Alert,
    SignificantWaveHeight,
    WavePeakPeriod,
    WaveMeanDirection,
    WindSpeed,
    WindDirection,
}

impl Metric {
    pub const ALL: [Metric; 10] = [
        Metric::BottomTemperature,
        Metric::TopTemperature,
        Metric::SatelliteTemperature,
        Metric::DegreeHeatingDays,
        Metric::Alert,
        Metric::SignificantWaveHeight,
        Metric::WavePeakPeriod,
        Metric::WaveMeanDirection,
        Metric::WindSpeed,
        Metric::WindDirection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::BottomTemperature => "bottom_temperature",
            Metric::TopTemperature => "top_temperature",
            Metric::SatelliteTemperature => "satellite_temperature",
            Metric::DegreeHeatingDays => "degree_heating_days",
            Metric::Alert => "alert",
            Metric::SignificantWaveHeight => "significant_wave_height",
            Metric::WavePeakPeriod => "wave_peak_period",
            Metric::WaveMeanDirection => "wave_mean_direction",
            Metric::WindSpeed => "wind_speed",
            Metric::WindDirection => "wind_direction",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Metric::ALL.into_iter().find(|m| m.as_str() == s)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `(timestamp, value)` sample from a provider, in the reef's local zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SofarValue {
    pub timestamp: DateTime<FixedOffset>,
    pub value: f64,
}

impl SofarValue {
    pub fn new(timestamp: DateTime<FixedOffset>, value: f64) -> Self {
        Self { timestamp, value }
    }

    pub fn utc(&self) -> DateTime<Utc> {
        self.timestamp.with_timezone(&Utc)
    }
}

/// All series reported by one spotter over a window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorData {
    pub surface_temperature: Vec<SofarValue>,
    pub bottom_temperature: Vec<SofarValue>,
    pub significant_wave_height: Vec<SofarValue>,
    pub wave_peak_period: Vec<SofarValue>,
    pub wave_mean_direction: Vec<SofarValue>,
    pub latitude: Vec<SofarValue>,
    pub longitude: Vec<SofarValue>,
}

impl SensorData {
    /// Drops every sample that falls inside one of `windows`.
    pub fn exclude(&mut self, windows: &[ExclusionWindow]) {
        if windows.is_empty() {
            return;
        }
        let keep = |v: &SofarValue| !windows.iter().any(|w| w.contains(v.utc()));
        for series in self.series_mut() {
            series.retain(keep);
        }
    }

    fn series_mut(&mut self) -> [&mut Vec<SofarValue>; 7] {
        [
            &mut self.surface_temperature,
            &mut self.bottom_temperature,
            &mut self.significant_wave_height,
            &mut self.wave_peak_period,
            &mut self.wave_mean_direction,
            &mut self.latitude,
            &mut self.longitude,
        ]
    }
}

/// A persisted time-series row. Unique on (site, source, metric, timestamp).
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesPoint {
    pub site_id: i32,
    pub source_id: i32,
    pub metric: Metric,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

// ---------------------------------------------------------------------------
// Daily summary
// ---------------------------------------------------------------------------

/// Aggregates for one reef over one local calendar date.
/// Unique on (site_id, date).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DailySummary {
    pub site_id: i32,
    pub date: NaiveDate,
    pub min_bottom_temperature: Option<f64>,
    pub max_bottom_temperature: Option<f64>,
    pub avg_bottom_temperature: Option<f64>,
    pub surface_temperature: Option<f64>,
    pub satellite_temperature: Option<f64>,
    pub degree_heating_days: Option<f64>,
    pub min_wave_height: Option<f64>,
    pub max_wave_height: Option<f64>,
    pub avg_wave_height: Option<f64>,
    pub wave_direction: Option<i32>,
    pub wave_period: Option<i32>,
    pub min_wind_speed: Option<f64>,
    pub max_wind_speed: Option<f64>,
    pub avg_wind_speed: Option<f64>,
    pub wind_direction: Option<i32>,
    pub daily_alert_level: Option<i16>,
}

impl DailySummary {
    pub fn new(site_id: i32, date: NaiveDate) -> Self {
        Self {
            site_id,
            date,
            ..Self::default()
        }
    }

    /// Overwrites fields of `self` with the non-null fields of `newer`.
    /// Fields `newer` leaves null keep their existing value.
    pub fn merge_non_null(&mut self, newer: &DailySummary) {
        fn take<T: Copy>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }
        take(&mut self.min_bottom_temperature, newer.min_bottom_temperature);
        take(&mut self.max_bottom_temperature, newer.max_bottom_temperature);
        take(&mut self.avg_bottom_temperature, newer.avg_bottom_temperature);
        take(&mut self.surface_temperature, newer.surface_temperature);
        take(&mut self.satellite_temperature, newer.satellite_temperature);
        take(&mut self.degree_heating_days, newer.degree_heating_days);
        take(&mut self.min_wave_height, newer.min_wave_height);
        take(&mut self.max_wave_height, newer.max_wave_height);
        take(&mut self.avg_wave_height, newer.avg_wave_height);
        take(&mut self.wave_direction, newer.wave_direction);
        take(&mut self.wave_period, newer.wave_period);
        take(&mut self.min_wind_speed, newer.min_wind_speed);
        take(&mut self.max_wind_speed, newer.max_wind_speed);
        take(&mut self.avg_wind_speed, newer.avg_wind_speed);
        take(&mut self.wind_direction, newer.wind_direction);
        take(&mut self.daily_alert_level, newer.daily_alert_level);
    }

    /// The single daily value this summary holds for `metric`, if any.
    /// Min/max aggregates are not exposed here; averages stand in.
    pub fn value_for(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::BottomTemperature => self.avg_bottom_temperature,
            Metric::TopTemperature => self.surface_temperature,
            Metric::SatelliteTemperature => self.satellite_temperature,
            Metric::DegreeHeatingDays => self.degree_heating_days,
            Metric::Alert => self.daily_alert_level.map(f64::from),
            Metric::SignificantWaveHeight => self.avg_wave_height,
            Metric::WavePeakPeriod => self.wave_period.map(f64::from),
            Metric::WaveMeanDirection => self.wave_direction.map(f64::from),
            Metric::WindSpeed => self.avg_wind_speed,
            Metric::WindDirection => self.wind_direction.map(f64::from),
        }
    }
}

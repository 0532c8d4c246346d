/// Data ingestion from the Sofar marine-weather and spotter APIs.
///
/// Submodules:
/// - `sofar`: HTTP client, URL builders and response parsing.
/// - `fixtures`: captured provider responses for unit tests.
///
/// The rest of the crate talks to providers only through the
/// `ProviderClient` trait, so the aggregation engine can be driven by a
/// scripted fake in tests.

pub mod sofar;

#[cfg(test)]
pub mod fixtures;

use chrono::{DateTime, LocalResult, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;

use crate::model::{SensorData, SofarValue};

// ---------------------------------------------------------------------------
// Model catalogue
// ---------------------------------------------------------------------------

/// One variable of one Sofar model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelVariable {
    pub model: &'static str,
    pub variable: &'static str,
}

pub const CRW_DEGREE_HEATING_WEEK: ModelVariable = ModelVariable {
    model: "NOAACoralReefWatch",
    variable: "degreeHeatingWeek",
};

pub const CRW_SEA_SURFACE_TEMPERATURE: ModelVariable = ModelVariable {
    model: "NOAACoralReefWatch",
    variable: "analysedSeaSurfaceTemperature",
};

pub const HYCOM_SEA_SURFACE_TEMPERATURE: ModelVariable = ModelVariable {
    model: "HYCOM",
    variable: "HYCOM-seaSurfaceTemperature",
};

pub const WAVE_SIGNIFICANT_HEIGHT: ModelVariable = ModelVariable {
    model: "NOAAOperationalWaveModel",
    variable: "NOAAOperationalWaveModel-significantWaveHeight",
};

pub const WAVE_MEAN_DIRECTION: ModelVariable = ModelVariable {
    model: "NOAAOperationalWaveModel",
    variable: "NOAAOperationalWaveModel-meanDirectionWindWaves",
};

pub const WAVE_PEAK_PERIOD: ModelVariable = ModelVariable {
    model: "NOAAOperationalWaveModel",
    variable: "NOAAOperationalWaveModel-peakPeriod",
};

pub const GFS_WIND_SPEED: ModelVariable = ModelVariable {
    model: "GFS",
    variable: "GFS-magnitude10MeterWind",
};

pub const GFS_WIND_DIRECTION: ModelVariable = ModelVariable {
    model: "GFS",
    variable: "GFS-direction10MeterWind",
};

// ---------------------------------------------------------------------------
// Requests and errors
// ---------------------------------------------------------------------------

/// Which Sofar endpoint a series comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesKind {
    /// Past model output over an explicit window.
    Hindcast,
    /// The current model run; the window is chosen by the provider.
    Forecast,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRequest {
    pub source: ModelVariable,
    pub kind: SeriesKind,
    pub latitude: f64,
    pub longitude: f64,
    pub time_zone: Tz,
    pub reference: DateTime<Utc>,
    /// `None` selects the whole local calendar day of `reference`.
    pub lookback_hours: Option<u32>,
}

impl SeriesRequest {
    /// Hindcast over the local calendar day `date`.
    pub fn for_day(
        source: ModelVariable,
        latitude: f64,
        longitude: f64,
        time_zone: Tz,
        date: NaiveDate,
    ) -> Self {
        let (start, _) = day_window(time_zone, date);
        Self {
            source,
            kind: SeriesKind::Hindcast,
            latitude,
            longitude,
            time_zone,
            reference: start,
            lookback_hours: None,
        }
    }

    /// Inclusive UTC bounds of the requested window.
    pub fn window(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        request_window(self.time_zone, self.reference, self.lookback_hours)
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    #[error("network error contacting provider: {0}")]
    Network(String),
    #[error("provider rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("unparseable provider response: {0}")]
    Parse(String),
}

impl ProviderError {
    /// Only transport failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Network(_))
    }
}

// ---------------------------------------------------------------------------
// Provider seam
// ---------------------------------------------------------------------------

/// Uniform access to remote series. Empty results are `Ok(vec![])`, never
/// an error.
pub trait ProviderClient: Send + Sync {
    fn fetch_series(&self, request: &SeriesRequest) -> Result<Vec<SofarValue>, ProviderError>;

    /// All series of one spotter over the local day of `reference`, or over
    /// `[reference - lookback_hours, reference]`.
    fn fetch_sensor_series(
        &self,
        sensor_id: &str,
        time_zone: Tz,
        reference: DateTime<Utc>,
        lookback_hours: Option<u32>,
    ) -> Result<SensorData, ProviderError>;
}

// ---------------------------------------------------------------------------
// Time windows
// ---------------------------------------------------------------------------

/// The UTC instant of local midnight starting `date` in `tz`.
///
/// Where midnight is skipped by a DST change the first valid local time
/// after it is used; where it is repeated, the earlier instant.
pub fn local_midnight(tz: Tz, date: NaiveDate) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    let local = match tz.from_local_datetime(&naive) {
        LocalResult::Single(t) => t,
        LocalResult::Ambiguous(earlier, _) => earlier,
        LocalResult::None => (1..=3)
            .find_map(|h| tz.from_local_datetime(&(naive + TimeDelta::hours(h))).earliest())
            .unwrap_or_else(|| tz.from_utc_datetime(&naive)),
    };
    local.with_timezone(&Utc)
}

/// Inclusive UTC bounds of the local calendar day `date`.
pub fn day_window(tz: Tz, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = local_midnight(tz, date);
    let next = date.succ_opt().map(|d| local_midnight(tz, d)).unwrap_or(start + TimeDelta::days(1));
    (start, next - TimeDelta::milliseconds(1))
}

/// Inclusive UTC bounds for a request anchored at `reference`.
pub fn request_window(
    tz: Tz,
    reference: DateTime<Utc>,
    lookback_hours: Option<u32>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    match lookback_hours {
        Some(hours) => (reference - TimeDelta::hours(i64::from(hours)), reference),
        None => day_window(tz, reference.with_timezone(&tz).date_naive()),
    }
}

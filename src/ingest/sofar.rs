/// Sofar API client.
///
/// Two endpoints are used:
///   {base}/marine-weather/v1/models/{model}/hindcast/point  (and /forecast/point)
///   {base}/api/wave-data                                    (spotter telemetry)
///
/// All responses are normalised the same way: timestamps are converted into
/// the reef's local zone, `9999` and null values are dropped, samples
/// outside the requested window are dropped, and the series is sorted
/// ascending. See `fixtures.rs` for annotated response shapes.

use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::env;
use std::time::Duration;
use tracing::{debug, warn};

use super::{ProviderClient, ProviderError, SeriesKind, SeriesRequest, request_window};
use crate::config::ProviderConfig;
use crate::model::{SensorData, SofarValue, NO_DATA_SENTINEL};

/// Records requested per spotter call; a day of 30-minute telemetry is 48.
const WAVE_DATA_LIMIT: u32 = 500;

/// Smart-mooring channel of the surface temperature sensor.
const SURFACE_SENSOR_POSITION: i32 = 1;

// ---------------------------------------------------------------------------
// Serde structures
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ModelResponse {
    #[serde(rename = "hindcastVariables", alias = "forecastVariables", default)]
    variables: Vec<ModelSeries>,
}

#[derive(Deserialize)]
struct ModelSeries {
    #[serde(default)]
    values: Vec<RawValue>,
}

#[derive(Deserialize)]
struct RawValue {
    timestamp: String,
    value: Option<f64>,
}

#[derive(Deserialize)]
struct WaveDataResponse {
    data: WaveData,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WaveData {
    #[serde(default)]
    waves: Vec<WaveRecord>,
    #[serde(default)]
    smart_mooring_data: Vec<MooringRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WaveRecord {
    significant_wave_height: Option<f64>,
    peak_period: Option<f64>,
    mean_direction: Option<f64>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    timestamp: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MooringRecord {
    sensor_position: i32,
    value: Option<f64>,
    timestamp: String,
}

// ---------------------------------------------------------------------------
// URL construction
// ---------------------------------------------------------------------------

fn api_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Hindcast point query for one model variable over `[start, end]`.
pub fn build_hindcast_url(
    base_url: &str,
    model: &str,
    variable: &str,
    latitude: f64,
    longitude: f64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> String {
    format!(
        "{}/marine-weather/v1/models/{}/hindcast/point?variableIDs={}&latitude={}&longitude={}&start={}&end={}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(model),
        urlencoding::encode(variable),
        latitude,
        longitude,
        urlencoding::encode(&api_timestamp(start)),
        urlencoding::encode(&api_timestamp(end)),
    )
}

/// Forecast point query for one model variable (latest model run).
pub fn build_forecast_url(
    base_url: &str,
    model: &str,
    variable: &str,
    latitude: f64,
    longitude: f64,
) -> String {
    format!(
        "{}/marine-weather/v1/models/{}/forecast/point?variableIDs={}&latitude={}&longitude={}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(model),
        urlencoding::encode(variable),
        latitude,
        longitude,
    )
}

/// Spotter telemetry over `[start, end]`, including smart-mooring channels.
pub fn build_wave_data_url(
    base_url: &str,
    spotter_id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> String {
    format!(
        "{}/api/wave-data?spotterId={}&startDate={}&endDate={}&limit={}&includeSmartMooringData=true",
        base_url.trim_end_matches('/'),
        urlencoding::encode(spotter_id),
        urlencoding::encode(&api_timestamp(start)),
        urlencoding::encode(&api_timestamp(end)),
        WAVE_DATA_LIMIT,
    )
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

type Window = (DateTime<Utc>, DateTime<Utc>);

/// Converts one raw sample into a local-zone value, or `None` when it is
/// a sentinel, null, unparseable or outside `window`.
fn normalise(
    timestamp: &str,
    value: Option<f64>,
    tz: Tz,
    window: Option<Window>,
) -> Option<SofarValue> {
    let value = value.filter(|v| v.is_finite() && (v - NO_DATA_SENTINEL).abs() > f64::EPSILON)?;
    let parsed = match DateTime::parse_from_rfc3339(timestamp) {
        Ok(t) => t,
        Err(e) => {
            debug!(timestamp, error = %e, "skipping sample with unparseable timestamp");
            return None;
        }
    };
    let utc = parsed.with_timezone(&Utc);
    if let Some((start, end)) = window {
        if utc < start || utc > end {
            return None;
        }
    }
    Some(SofarValue::new(utc.with_timezone(&tz).fixed_offset(), value))
}

fn sorted(mut series: Vec<SofarValue>) -> Vec<SofarValue> {
    series.sort_by_key(|v| v.timestamp);
    series
}

/// Parses a hindcast or forecast point response into one series.
///
/// A response with no variables, or variables with no usable values, is an
/// empty series rather than an error.
pub fn parse_model_response(
    json: &str,
    tz: Tz,
    window: Option<Window>,
) -> Result<Vec<SofarValue>, ProviderError> {
    let response: ModelResponse = serde_json::from_str(json)
        .map_err(|e| ProviderError::Parse(format!("model response: {}", e)))?;

    let series = response
        .variables
        .into_iter()
        .flat_map(|v| v.values)
        .filter_map(|raw| normalise(&raw.timestamp, raw.value, tz, window))
        .collect();
    Ok(sorted(series))
}

/// Parses a spotter wave-data response into named series.
pub fn parse_wave_data_response(
    json: &str,
    tz: Tz,
    window: Option<Window>,
) -> Result<SensorData, ProviderError> {
    let response: WaveDataResponse = serde_json::from_str(json)
        .map_err(|e| ProviderError::Parse(format!("wave-data response: {}", e)))?;

    let mut data = SensorData::default();
    for record in &response.data.waves {
        let at = |value: Option<f64>| normalise(&record.timestamp, value, tz, window);
        data.significant_wave_height.extend(at(record.significant_wave_height));
        data.wave_peak_period.extend(at(record.peak_period));
        data.wave_mean_direction.extend(at(record.mean_direction));
        data.latitude.extend(at(record.latitude));
        data.longitude.extend(at(record.longitude));
    }
    for record in &response.data.smart_mooring_data {
        let Some(point) = normalise(&record.timestamp, record.value, tz, window) else {
            continue;
        };
        if record.sensor_position == SURFACE_SENSOR_POSITION {
            data.surface_temperature.push(point);
        } else {
            data.bottom_temperature.push(point);
        }
    }

    Ok(SensorData {
        surface_temperature: sorted(data.surface_temperature),
        bottom_temperature: sorted(data.bottom_temperature),
        significant_wave_height: sorted(data.significant_wave_height),
        wave_peak_period: sorted(data.wave_peak_period),
        wave_mean_direction: sorted(data.wave_mean_direction),
        latitude: sorted(data.latitude),
        longitude: sorted(data.longitude),
    })
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// Blocking client for the Sofar APIs. Built once at startup and shared.
pub struct SofarClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl SofarClient {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Network(format!("building HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            token,
        })
    }

    /// Builds a client from `[provider]`, reading the token from the
    /// environment variable it names.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let token = env::var(&config.token_env).ok().filter(|t| !t.trim().is_empty());
        if token.is_none() {
            warn!(
                token_env = %config.token_env,
                "no Sofar API token in environment; spotter requests will be rejected"
            );
        }
        Self::new(config.base_url.clone(), token, Duration::from_secs(config.timeout_seconds))
    }

    fn get(&self, url: &str) -> Result<String, ProviderError> {
        debug!(url, "GET");
        let mut request = self.http.get(url).header("Accept", "application/json");
        if let Some(token) = &self.token {
            request = request.header("token", token);
        }

        let response = request.send().map_err(|e| ProviderError::Network(e.to_string()))?;
        let status = response.status();
        let body = response.text().map_err(|e| ProviderError::Network(e.to_string()))?;

        if !status.is_success() {
            let message: String = body.chars().take(200).collect();
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        Ok(body)
    }
}

impl ProviderClient for SofarClient {
    fn fetch_series(&self, request: &SeriesRequest) -> Result<Vec<SofarValue>, ProviderError> {
        let source = request.source;
        match request.kind {
            SeriesKind::Hindcast => {
                let (start, end) = request.window();
                let url = build_hindcast_url(
                    &self.base_url,
                    source.model,
                    source.variable,
                    request.latitude,
                    request.longitude,
                    start,
                    end,
                );
                parse_model_response(&self.get(&url)?, request.time_zone, Some((start, end)))
            }
            SeriesKind::Forecast => {
                let url = build_forecast_url(
                    &self.base_url,
                    source.model,
                    source.variable,
                    request.latitude,
                    request.longitude,
                );
                parse_model_response(&self.get(&url)?, request.time_zone, None)
            }
        }
    }

    fn fetch_sensor_series(
        &self,
        sensor_id: &str,
        time_zone: Tz,
        reference: DateTime<Utc>,
        lookback_hours: Option<u32>,
    ) -> Result<SensorData, ProviderError> {
        let window = request_window(time_zone, reference, lookback_hours);
        let url = build_wave_data_url(&self.base_url, sensor_id, window.0, window.1);
        parse_wave_data_response(&self.get(&url)?, time_zone, Some(window))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::fixtures::*;
    use crate::ingest::{HYCOM_SEA_SURFACE_TEMPERATURE, day_window};
    use chrono::{NaiveDate, TimeZone};

    const BASE: &str = "https://api.sofarocean.com";

    fn pacific() -> Tz {
        "Etc/GMT+12".parse().unwrap()
    }

    fn july_6_window() -> Window {
        day_window(pacific(), NaiveDate::from_ymd_opt(2020, 7, 6).unwrap())
    }

    // --- URL construction ---------------------------------------------------

    #[test]
    fn test_hindcast_url_targets_model_point_endpoint() {
        let (start, end) = july_6_window();
        let source = HYCOM_SEA_SURFACE_TEMPERATURE;
        let url =
            build_hindcast_url(BASE, source.model, source.variable, -3.59, -178.0, start, end);
        let expected = "https://api.sofarocean.com/marine-weather/v1/models/HYCOM/hindcast/point?";
        assert!(url.starts_with(expected), "got {}", url);
        assert!(url.contains("variableIDs=HYCOM-seaSurfaceTemperature"));
        assert!(url.contains("latitude=-3.59") && url.contains("longitude=-178"));
        assert!(url.contains("start=2020-07-06T12%3A00%3A00.000Z"), "got {}", url);
    }

    #[test]
    fn test_base_url_trailing_slash_is_tolerated() {
        let url = build_forecast_url(
            "https://example.test/",
            "GFS",
            "GFS-magnitude10MeterWind",
            1.0,
            2.0,
        );
        assert!(url.starts_with("https://example.test/marine-weather/"), "got {}", url);
    }

    #[test]
    fn test_wave_data_url_requests_smart_mooring_channels() {
        let (start, end) = july_6_window();
        let url = build_wave_data_url(BASE, "SPOT-300434063450120", start, end);
        assert!(url.contains("/api/wave-data?spotterId=SPOT-300434063450120"));
        assert!(url.contains("includeSmartMooringData=true"));
        assert!(url.contains("startDate=") && url.contains("endDate="));
    }

    // --- Model responses ----------------------------------------------------

    fn july_6_hindcast() -> Vec<SofarValue> {
        parse_model_response(fixture_hycom_hindcast_json(), pacific(), Some(july_6_window()))
            .unwrap()
    }

    fn july_6_wave_data() -> SensorData {
        parse_wave_data_response(fixture_spotter_wave_data_json(), pacific(), Some(july_6_window()))
            .unwrap()
    }

    #[test]
    fn test_hindcast_drops_sentinels_nulls_and_out_of_window_samples() {
        let numbers: Vec<f64> = july_6_hindcast().iter().map(|v| v.value).collect();
        assert_eq!(
            numbers,
            vec![
                29.3450012207031,
                29.4020004272461,
                29.3900012969971,
                29.4540004730225,
                29.4029998779297,
                29.423999786377
            ]
        );
    }

    #[test]
    fn test_hindcast_values_are_sorted_and_in_local_zone() {
        let values = july_6_hindcast();
        assert!(values.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        let first = &values[0];
        assert_eq!(first.timestamp.offset().local_minus_utc(), -12 * 3600);
        assert_eq!(first.utc(), Utc.with_ymd_and_hms(2020, 7, 6, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_forecast_envelope_is_accepted() {
        let values = parse_model_response(fixture_gfs_forecast_json(), Tz::UTC, None).unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[1].value, 5.1);
    }

    #[test]
    fn test_empty_model_response_is_empty_not_error() {
        let values = parse_model_response(fixture_empty_hindcast_json(), Tz::UTC, None).unwrap();
        assert!(values.is_empty());
        let values = parse_model_response("{}", Tz::UTC, None).unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn test_malformed_body_is_parse_error() {
        let err = parse_model_response(fixture_malformed_json(), Tz::UTC, None).unwrap_err();
        assert!(matches!(err, ProviderError::Parse(_)), "got {:?}", err);
    }

    // --- Spotter responses --------------------------------------------------

    #[test]
    fn test_wave_data_splits_mooring_channels_by_position() {
        let data = july_6_wave_data();
        assert_eq!(data.surface_temperature.len(), 1);
        assert_eq!(data.surface_temperature[0].value, 29.1);
        let bottom: Vec<f64> = data.bottom_temperature.iter().map(|v| v.value).collect();
        assert_eq!(bottom, vec![28.4, 28.2]);
    }

    #[test]
    fn test_wave_data_drops_missing_wave_fields_per_variable() {
        let data = july_6_wave_data();
        assert_eq!(data.significant_wave_height.len(), 2);
        assert_eq!(data.wave_peak_period.len(), 1);
        assert_eq!(data.wave_mean_direction.len(), 1);
        assert_eq!(data.wave_mean_direction[0].value, 182.0);
        assert_eq!(data.latitude.len(), 2);
    }

    #[test]
    fn test_empty_spotter_response_has_empty_series() {
        let data = parse_wave_data_response(fixture_spotter_empty_json(), pacific(), None).unwrap();
        assert_eq!(data, SensorData::default());
    }

    #[test]
    fn test_missing_token_is_allowed_at_construction() {
        let client = SofarClient::new(BASE, None, Duration::from_secs(5));
        assert!(client.is_ok());
    }
}

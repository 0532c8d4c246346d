/// Test fixtures: representative JSON payloads from the Sofar APIs.
///
/// Marine-weather point endpoint shape (hindcast and forecast):
///   hindcastVariables[] | forecastVariables[]
///     .variableID
///     .units
///     .values[]
///       .timestamp: ISO 8601, UTC
///       .value: number, `9999` or null when the model has no value
///
/// Spotter wave-data shape:
///   data.spotterId
///   data.waves[]
///     .significantWaveHeight, .peakPeriod, .meanDirection
///     .latitude, .longitude, .timestamp
///   data.smartMooringData[]
///     .sensorPosition: 1 is the surface sensor, anything else is at depth
///     .value: water temperature in °C
///     .timestamp

/// HYCOM sea surface temperature for a reef at 178°W on 2020-07-06 local
/// time (Etc/GMT+12). Carries one sentinel, one null and one sample from
/// the next local day.
pub(crate) fn fixture_hycom_hindcast_json() -> &'static str {
    r#"{
      "hindcastVariables": [
        {
          "variableID": "HYCOM-seaSurfaceTemperature",
          "units": "C",
          "values": [
            { "timestamp": "2020-07-06T15:00:00.000Z", "value": 29.4020004272461 },
            { "timestamp": "2020-07-06T12:00:00.000Z", "value": 29.3450012207031 },
            { "timestamp": "2020-07-06T18:00:00.000Z", "value": 29.3900012969971 },
            { "timestamp": "2020-07-06T21:00:00.000Z", "value": 9999 },
            { "timestamp": "2020-07-07T00:00:00.000Z", "value": 29.4540004730225 },
            { "timestamp": "2020-07-07T03:00:00.000Z", "value": null },
            { "timestamp": "2020-07-07T06:00:00.000Z", "value": 29.4029998779297 },
            { "timestamp": "2020-07-07T09:00:00.000Z", "value": 29.423999786377 },
            { "timestamp": "2020-07-07T12:00:00.000Z", "value": 29.5 }
          ]
        }
      ]
    }"#
}

/// A forecast response for GFS wind speed.
pub(crate) fn fixture_gfs_forecast_json() -> &'static str {
    r#"{
      "forecastVariables": [
        {
          "variableID": "GFS-magnitude10MeterWind",
          "units": "m/s",
          "values": [
            { "timestamp": "2020-07-07T00:00:00.000Z", "value": 4.2 },
            { "timestamp": "2020-07-07T03:00:00.000Z", "value": 5.1 }
          ]
        }
      ]
    }"#
}

/// Point outside model coverage: the variable is present with no values.
pub(crate) fn fixture_empty_hindcast_json() -> &'static str {
    r#"{ "hindcastVariables": [ { "variableID": "degreeHeatingWeek", "values": [] } ] }"#
}

/// Spotter with wave records and two smart-mooring temperature channels.
pub(crate) fn fixture_spotter_wave_data_json() -> &'static str {
    r#"{
      "data": {
        "spotterId": "SPOT-300434063450120",
        "waves": [
          {
            "significantWaveHeight": 1.12,
            "peakPeriod": 9.1,
            "meanDirection": 182.0,
            "latitude": -3.5976,
            "longitude": -178.0001,
            "timestamp": "2020-07-06T13:00:00.000Z"
          },
          {
            "significantWaveHeight": 1.30,
            "peakPeriod": null,
            "meanDirection": 9999,
            "latitude": -3.5978,
            "longitude": -178.0003,
            "timestamp": "2020-07-06T14:00:00.000Z"
          }
        ],
        "smartMooringData": [
          { "sensorPosition": 1, "value": 29.1, "timestamp": "2020-07-06T13:00:00.000Z" },
          { "sensorPosition": 2, "value": 28.4, "timestamp": "2020-07-06T13:00:00.000Z" },
          { "sensorPosition": 2, "value": 28.2, "timestamp": "2020-07-06T14:00:00.000Z" }
        ]
      }
    }"#
}

/// Spotter that reported nothing in the window.
pub(crate) fn fixture_spotter_empty_json() -> &'static str {
    r#"{ "data": { "spotterId": "SPOT-300434063450120", "waves": [] } }"#
}

/// Body that is not the expected envelope.
pub(crate) fn fixture_malformed_json() -> &'static str {
    r#"{ "message": "Unauthorized" "#
}

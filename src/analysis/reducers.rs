/// Statistical reducers over provider series.
///
/// All reducers return `None` for empty input ("no data"); none of them
/// default to zero or infinity.
///
/// Direction means are plain arithmetic means of degree values, not
/// circular means. Values near the 0°/360° boundary average badly; this is
/// kept so recomputed history matches what is already stored.

use chrono::{DateTime, TimeZone};

use crate::model::SofarValue;

// ---------------------------------------------------------------------------
// Scalar reducers
// ---------------------------------------------------------------------------

pub fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}

pub fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

/// Arithmetic mean. With `round`, the mean is rounded half-up to an
/// integer (used for directions and periods).
pub fn mean(values: &[f64], round: bool) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let average = values.iter().sum::<f64>() / values.len() as f64;
    Some(if round { (average + 0.5).floor() } else { average })
}

/// Rounded mean as an integer, for the integer columns of the daily summary.
pub fn rounded_mean(values: &[f64]) -> Option<i32> {
    mean(values, true).map(|v| v as i32)
}

/// (min, max, mean) in one call.
pub fn min_max_mean(values: &[f64]) -> (Option<f64>, Option<f64>, Option<f64>) {
    (min(values), max(values), mean(values, false))
}

pub fn values_of(series: &[SofarValue]) -> Vec<f64> {
    series.iter().map(|v| v.value).collect()
}

// ---------------------------------------------------------------------------
// Temporal reducers
// ---------------------------------------------------------------------------

/// Point minimizing the absolute time distance to `reference`.
/// Ties go to the first point encountered.
pub fn closest_to<'a, Tz: TimeZone>(
    series: &'a [SofarValue],
    reference: &DateTime<Tz>,
) -> Option<&'a SofarValue> {
    let mut best: Option<(&SofarValue, i64)> = None;
    for point in series {
        let delta = (point.timestamp.timestamp_millis() - reference.timestamp_millis()).abs();
        match best {
            Some((_, best_delta)) if delta >= best_delta => {}
            _ => best = Some((point, delta)),
        }
    }
    best.map(|(point, _)| point)
}

/// As `closest_to`, but "no data" when the closest point is more than
/// `max_hours` away from `reference`.
pub fn closest_within_tolerance<'a, Tz: TimeZone>(
    series: &'a [SofarValue],
    reference: &DateTime<Tz>,
    max_hours: f64,
) -> Option<&'a SofarValue> {
    let tolerance_ms = max_hours * 3_600_000.0;
    closest_to(series, reference).filter(|point| {
        let delta = (point.timestamp.timestamp_millis() - reference.timestamp_millis()).abs();
        delta as f64 <= tolerance_ms
    })
}

/// Sorts a series ascending by timestamp. Provider output is normally
/// sorted already; positional reducers must not rely on that.
pub fn sort_chronologically(series: &mut [SofarValue]) {
    series.sort_by_key(|v| v.timestamp);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

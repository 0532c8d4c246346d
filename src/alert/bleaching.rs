//! Bleaching alert classification.
//!
//! Maps the reef's Maximum Monthly Mean, the current satellite sea surface
//! temperature and accumulated degree heating weeks onto the five NOAA
//! Coral Reef Watch alert levels. "Unknown" (`None`) is distinct from
//! `NoStress`.

use serde::{Serialize, Serializer};

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// HotSpot (SST above MMM, °C) at or above which accumulated stress matters.
pub const HOTSPOT_STRESS_THRESHOLD: f64 = 1.0;

/// Degree heating weeks at which Alert Level 1 starts.
pub const DHW_ALERT_LEVEL_1: f64 = 4.0;

/// Degree heating weeks at which Alert Level 2 starts.
pub const DHW_ALERT_LEVEL_2: f64 = 8.0;

/// Alert levels in ascending order of severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AlertLevel {
    NoStress = 0,
    Watch = 1,
    Warning = 2,
    AlertLevel1 = 3,
    AlertLevel2 = 4,
}

impl AlertLevel {
    pub fn as_number(&self) -> i16 {
        *self as i16
    }
}

impl Serialize for AlertLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i16(self.as_number())
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Classifies bleaching risk.
///
/// Returns `None` when the MMM is missing, or when both the current SST and
/// the DHW are. A missing DHW is treated as zero accumulated stress, which
/// keeps the level monotonic in SST.
///
/// | HotSpot (SST − MMM) | DHW        | Level        |
/// |---------------------|------------|--------------|
/// | ≤ 0                 | any        | NoStress     |
/// | (0, 1)              | any        | Watch        |
/// | ≥ 1                 | [0, 4)     | Warning      |
/// | ≥ 1                 | [4, 8)     | AlertLevel1  |
/// | ≥ 1                 | ≥ 8        | AlertLevel2  |
/// | unknown             | [0, 4)     | NoStress     |
/// | unknown             | [4, 8)     | AlertLevel1  |
/// | unknown             | ≥ 8        | AlertLevel2  |
pub fn classify(
    max_monthly_mean: Option<f64>,
    current_sst: Option<f64>,
    degree_heating_weeks: Option<f64>,
) -> Option<AlertLevel> {
    let mmm = max_monthly_mean?;
    let Some(sst) = current_sst else {
        return degree_heating_weeks.map(accumulated_stress_level);
    };
    let hotspot = sst - mmm;

    if hotspot <= 0.0 {
        return Some(AlertLevel::NoStress);
    }
    if hotspot < HOTSPOT_STRESS_THRESHOLD {
        return Some(AlertLevel::Watch);
    }

    Some(match accumulated_stress_level(degree_heating_weeks.unwrap_or(0.0)) {
        AlertLevel::NoStress => AlertLevel::Warning,
        level => level,
    })
}

/// Alert level from accumulated stress alone.
fn accumulated_stress_level(dhw: f64) -> AlertLevel {
    if dhw >= DHW_ALERT_LEVEL_2 {
        AlertLevel::AlertLevel2
    } else if dhw >= DHW_ALERT_LEVEL_1 {
        AlertLevel::AlertLevel1
    } else {
        AlertLevel::NoStress
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const MMM: Option<f64> = Some(28.0);

    #[test]
    fn test_missing_inputs_are_unknown() {
        assert_eq!(classify(None, Some(30.0), Some(5.0)), None);
        assert_eq!(classify(None, None, Some(9.0)), None);
        assert_eq!(classify(MMM, None, None), None);
    }

    #[test]
    fn test_missing_sst_classifies_by_accumulated_stress() {
        assert_eq!(classify(MMM, None, Some(0.0)), Some(AlertLevel::NoStress));
        assert_eq!(classify(MMM, None, Some(3.99)), Some(AlertLevel::NoStress));
        assert_eq!(classify(MMM, None, Some(4.0)), Some(AlertLevel::AlertLevel1));
        assert_eq!(classify(MMM, None, Some(9.0)), Some(AlertLevel::AlertLevel2));
    }

    #[test]
    fn test_unknown_is_distinct_from_no_stress() {
        assert_eq!(classify(MMM, Some(27.0), None), Some(AlertLevel::NoStress));
        assert_ne!(classify(MMM, None, None), Some(AlertLevel::NoStress));
    }

    #[test]
    fn test_threshold_bands() {
        assert_eq!(classify(MMM, Some(28.0), Some(10.0)), Some(AlertLevel::NoStress));
        assert_eq!(classify(MMM, Some(28.5), Some(10.0)), Some(AlertLevel::Watch));
        assert_eq!(classify(MMM, Some(29.0), Some(0.0)), Some(AlertLevel::Warning));
        assert_eq!(classify(MMM, Some(29.0), Some(3.99)), Some(AlertLevel::Warning));
        assert_eq!(classify(MMM, Some(29.0), Some(4.0)), Some(AlertLevel::AlertLevel1));
        assert_eq!(classify(MMM, Some(29.0), Some(8.0)), Some(AlertLevel::AlertLevel2));
    }

    #[test]
    fn test_missing_dhw_with_hotspot_counts_as_warning() {
        assert_eq!(classify(MMM, Some(29.5), None), Some(AlertLevel::Warning));
    }

    #[test]
    fn test_monotonic_in_sst_and_dhw() {
        let ssts: Vec<f64> = (0..=60).map(|i| 26.0 + i as f64 * 0.1).collect();
        let dhws: Vec<f64> = (0..=24).map(|i| i as f64 * 0.5).collect();

        for &dhw in &dhws {
            let levels: Vec<_> =
                ssts.iter().map(|&sst| classify(MMM, Some(sst), Some(dhw))).collect();
            assert!(
                levels.windows(2).all(|w| w[0] <= w[1]),
                "not monotonic in SST at DHW {}",
                dhw
            );
        }
        for &sst in &ssts {
            let levels: Vec<_> =
                dhws.iter().map(|&dhw| classify(MMM, Some(sst), Some(dhw))).collect();
            assert!(
                levels.windows(2).all(|w| w[0] <= w[1]),
                "not monotonic in DHW at SST {}",
                sst
            );
        }
        let without_sst: Vec<_> = dhws.iter().map(|&dhw| classify(MMM, None, Some(dhw))).collect();
        assert!(without_sst.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_levels_serialize_as_numbers() {
        let json = serde_json::to_string(&AlertLevel::AlertLevel1).unwrap();
        assert_eq!(json, "3");
    }
}

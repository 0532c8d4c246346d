/// Degree heating accumulation.
///
/// Degree heating days (DHD) for a day are the sum, over the trailing
/// 84 days of daily sea surface temperature, of `max(0, sst - MMM)`.
/// When that window cannot be computed the provider's Degree Heating Week
/// value is used instead (`DHD = DHW * 7`), and when that is missing too
/// the result is 0.

use thiserror::Error;
use tracing::debug;

/// Length of the accumulation window in days.
pub const DEGREE_HEATING_WINDOW_DAYS: usize = 84;

/// Days per degree heating week.
pub const DAYS_PER_WEEK: f64 = 7.0;

#[derive(Debug, Error, PartialEq)]
pub enum DegreeHeatingError {
    #[error("calculating degree heating days requires 84 days of data, only {provided} provided")]
    InsufficientHistory { provided: usize },
    #[error("reef has no maximum monthly mean baseline")]
    MissingBaseline,
}

/// How a degree heating value was obtained.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DegreeHeatingBasis {
    /// Summed from 84 days of daily SST.
    History,
    /// Converted from the provider's Degree Heating Week value.
    ProviderWeeks,
    /// Neither path produced data; the value is 0.
    NoData,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DegreeHeating {
    pub days: f64,
    pub basis: DegreeHeatingBasis,
}

impl DegreeHeating {
    pub fn weeks(&self) -> f64 {
        self.days / DAYS_PER_WEEK
    }

    /// The value, or `None` when nothing backed it.
    pub fn known_days(&self) -> Option<f64> {
        match self.basis {
            DegreeHeatingBasis::NoData => None,
            _ => Some(self.days),
        }
    }
}

/// Sums heat stress over the trailing 84 values of `daily_sst`.
pub fn degree_heating_days(
    daily_sst: &[f64],
    max_monthly_mean: Option<f64>,
) -> Result<f64, DegreeHeatingError> {
    let mmm = max_monthly_mean.ok_or(DegreeHeatingError::MissingBaseline)?;
    if daily_sst.len() < DEGREE_HEATING_WINDOW_DAYS {
        return Err(DegreeHeatingError::InsufficientHistory {
            provided: daily_sst.len(),
        });
    }
    let window = &daily_sst[daily_sst.len() - DEGREE_HEATING_WINDOW_DAYS..];
    Ok(window.iter().map(|sst| (sst - mmm).max(0.0)).sum())
}

/// Two-path resolution: the 84-day sum, or, if that raised, the provider's
/// latest DHW (fetched lazily through `latest_dhw`) times seven, or 0.
pub fn resolve_degree_heating_days<F>(
    daily_sst: &[f64],
    max_monthly_mean: Option<f64>,
    latest_dhw: F,
) -> DegreeHeating
where
    F: FnOnce() -> Option<f64>,
{
    match degree_heating_days(daily_sst, max_monthly_mean) {
        Ok(days) => DegreeHeating {
            days,
            basis: DegreeHeatingBasis::History,
        },
        Err(e) => {
            debug!(reason = %e, "falling back to provider degree heating weeks");
            match latest_dhw() {
                Some(weeks) => DegreeHeating {
                    days: weeks * DAYS_PER_WEEK,
                    basis: DegreeHeatingBasis::ProviderWeeks,
                },
                None => DegreeHeating {
                    days: 0.0,
                    basis: DegreeHeatingBasis::NoData,
                },
            }
        }
    }
}

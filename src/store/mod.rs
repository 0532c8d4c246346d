/// Persistence for reefs, provenance, daily summaries and time series.
///
/// Submodules:
/// - `postgres`: `PgGateway`, the production implementation.
/// - `memory`  : `MemoryGateway`, an in-process implementation with the
///                same conflict semantics.
///
/// Conflicts are part of the contract, not errors: a second daily summary
/// for the same (site, date) merges its non-null fields into the stored
/// row, and a time-series point that already exists is skipped.

pub mod memory;
pub mod postgres;

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::model::{DailySummary, ExclusionWindow, Site, Source, SourceType, TimeSeriesPoint};

pub use memory::MemoryGateway;
pub use self::postgres::PgGateway;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database query failed: {0}")]
    Query(#[from] ::postgres::Error),
    #[error("invalid row in {table}: {reason}")]
    InvalidRow { table: &'static str, reason: String },
    #[error("database connection lock poisoned")]
    Poisoned,
}

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// A row existed; its fields were overwritten where the new record had values.
    Updated,
}

pub trait PersistenceGateway: Send + Sync {
    fn find_site(&self, site_id: i32) -> Result<Option<Site>, StoreError>;

    /// Sites with the given ids, ordered by id. An empty slice means every site.
    fn find_sites(&self, site_ids: &[i32]) -> Result<Vec<Site>, StoreError>;

    /// Finds the provenance row for (site, type, spotter), creating it if needed.
    fn ensure_source(
        &self,
        site_id: i32,
        source_type: SourceType,
        spotter_id: Option<&str>,
    ) -> Result<Source, StoreError>;

    /// Exclusion windows of `spotter_id` overlapping `[start, end]`.
    fn find_exclusion_windows(
        &self,
        spotter_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ExclusionWindow>, StoreError>;

    /// Stored daily satellite temperatures for `start..=end`, ascending by
    /// date. Days without a value are absent.
    fn satellite_temperature_history(
        &self,
        site_id: i32,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<(NaiveDate, f64)>, StoreError>;

    fn latest_daily_date(&self, site_id: i32) -> Result<Option<NaiveDate>, StoreError>;

    fn upsert_daily_summary(&self, summary: &DailySummary) -> Result<UpsertOutcome, StoreError>;

    /// Inserts points, skipping any that already exist. Returns how many were new.
    fn insert_time_series_batch(&self, points: &[TimeSeriesPoint]) -> Result<usize, StoreError>;

    /// Refreshes the "latest data" view read by the API layer.
    fn refresh_latest_data(&self) -> Result<(), StoreError>;
}

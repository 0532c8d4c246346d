/// PostgreSQL persistence gateway.
///
/// One synchronous `postgres::Client` behind a mutex; worker threads take
/// turns. Uniqueness is enforced by the schema (see `sql/001_reef_schema.sql`):
///   daily_data   CONSTRAINT no_duplicated_date (reef_id, date)
///   time_series  CONSTRAINT no_duplicate_data  (reef_id, source_id, metric, timestamp)

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use postgres::types::ToSql;
use postgres::{Client, Row};
use rust_decimal::Decimal;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use super::{PersistenceGateway, StoreError, UpsertOutcome};
use crate::model::{DailySummary, ExclusionWindow, Site, Source, SourceType, TimeSeriesPoint};

/// Tables the gateway reads or writes.
pub const REQUIRED_TABLES: [&str; 5] =
    ["reef", "sources", "exclusion_dates", "daily_data", "time_series"];

/// Value columns of `daily_data`, in the parameter order of `daily_params`.
const DAILY_COLUMNS: [&str; 16] = [
    "min_bottom_temperature",
    "max_bottom_temperature",
    "avg_bottom_temperature",
    "surface_temperature",
    "satellite_temperature",
    "degree_heating_days",
    "min_wave_height",
    "max_wave_height",
    "avg_wave_height",
    "wave_direction",
    "wave_period",
    "min_wind_speed",
    "max_wind_speed",
    "avg_wind_speed",
    "wind_direction",
    "daily_alert_level",
];

const SITE_QUERY: &str = "SELECT id, name, \
     ST_X(ST_Centroid(polygon))::float8 AS longitude, \
     ST_Y(ST_Centroid(polygon))::float8 AS latitude, \
     timezone, max_monthly_mean, spotter_id, depth \
     FROM reef";

/// Builds the insert-or-merge statement: values from the new record win,
/// NULLs keep whatever the stored row had. `xmax = 0` only on fresh inserts.
fn upsert_daily_sql() -> String {
    let columns = DAILY_COLUMNS.join(", ");
    let placeholders: Vec<String> =
        (3..3 + DAILY_COLUMNS.len()).map(|i| format!("${}", i)).collect();
    let merges: Vec<String> = DAILY_COLUMNS
        .iter()
        .map(|c| format!("{c} = COALESCE(EXCLUDED.{c}, daily_data.{c})"))
        .collect();
    format!(
        "INSERT INTO daily_data (reef_id, date, {}) VALUES ($1, $2, {}) \
         ON CONFLICT ON CONSTRAINT no_duplicated_date DO UPDATE SET {}, updated_at = now() \
         RETURNING (xmax = 0) AS inserted",
        columns,
        placeholders.join(", "),
        merges.join(", ")
    )
}

fn daily_params(s: &DailySummary) -> Vec<&(dyn ToSql + Sync)> {
    vec![
        &s.site_id,
        &s.date,
        &s.min_bottom_temperature,
        &s.max_bottom_temperature,
        &s.avg_bottom_temperature,
        &s.surface_temperature,
        &s.satellite_temperature,
        &s.degree_heating_days,
        &s.min_wave_height,
        &s.max_wave_height,
        &s.avg_wave_height,
        &s.wave_direction,
        &s.wave_period,
        &s.min_wind_speed,
        &s.max_wind_speed,
        &s.avg_wind_speed,
        &s.wind_direction,
        &s.daily_alert_level,
    ]
}

fn site_from_row(row: &Row) -> Result<Site, StoreError> {
    let id: i32 = row.get("id");
    let zone: String = row.get("timezone");
    let time_zone: Tz = zone.parse().map_err(|_| StoreError::InvalidRow {
        table: "reef",
        reason: format!("reef {} has unknown time zone '{}'", id, zone),
    })?;
    Ok(Site {
        id,
        name: row.get("name"),
        longitude: row.get("longitude"),
        latitude: row.get("latitude"),
        time_zone,
        max_monthly_mean: row.get("max_monthly_mean"),
        spotter_id: row.get("spotter_id"),
        depth: row.get("depth"),
    })
}

fn source_from_row(row: &Row) -> Result<Source, StoreError> {
    let kind: String = row.get("type");
    let source_type = SourceType::parse(&kind).ok_or_else(|| StoreError::InvalidRow {
        table: "sources",
        reason: format!("unknown source type '{}'", kind),
    })?;
    Ok(Source {
        id: row.get("id"),
        site_id: row.get("reef_id"),
        source_type,
        depth: row.get("depth"),
        spotter_id: row.get("spotter_id"),
    })
}

pub struct PgGateway {
    client: Mutex<Client>,
}

impl PgGateway {
    pub fn new(client: Client) -> Self {
        Self {
            client: Mutex::new(client),
        }
    }

    fn client(&self) -> Result<MutexGuard<'_, Client>, StoreError> {
        self.client.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl PersistenceGateway for PgGateway {
    fn find_site(&self, site_id: i32) -> Result<Option<Site>, StoreError> {
        let sql = format!("{} WHERE id = $1", SITE_QUERY);
        let row = self.client()?.query_opt(sql.as_str(), &[&site_id])?;
        row.as_ref().map(site_from_row).transpose()
    }

    fn find_sites(&self, site_ids: &[i32]) -> Result<Vec<Site>, StoreError> {
        let rows = if site_ids.is_empty() {
            let sql = format!("{} ORDER BY id", SITE_QUERY);
            self.client()?.query(sql.as_str(), &[])?
        } else {
            let sql = format!("{} WHERE id = ANY($1) ORDER BY id", SITE_QUERY);
            let ids: Vec<i32> = site_ids.to_vec();
            self.client()?.query(sql.as_str(), &[&ids])?
        };
        rows.iter().map(site_from_row).collect()
    }

    fn ensure_source(
        &self,
        site_id: i32,
        source_type: SourceType,
        spotter_id: Option<&str>,
    ) -> Result<Source, StoreError> {
        let mut client = self.client()?;
        let kind = source_type.as_str();
        let existing = client.query_opt(
            "SELECT id, reef_id, type, depth, spotter_id FROM sources \
             WHERE reef_id = $1 AND type = $2 AND spotter_id IS NOT DISTINCT FROM $3 \
             ORDER BY id LIMIT 1",
            &[&site_id, &kind, &spotter_id],
        )?;
        if let Some(row) = existing {
            return source_from_row(&row);
        }

        let row = client.query_one(
            "INSERT INTO sources (reef_id, type, spotter_id) VALUES ($1, $2, $3) \
             RETURNING id, reef_id, type, depth, spotter_id",
            &[&site_id, &kind, &spotter_id],
        )?;
        debug!(site_id, source_type = kind, "created source");
        source_from_row(&row)
    }

    fn find_exclusion_windows(
        &self,
        spotter_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ExclusionWindow>, StoreError> {
        let rows = self.client()?.query(
            "SELECT spotter_id, start_date, end_date FROM exclusion_dates \
             WHERE spotter_id = $1 AND end_date >= $2 \
             AND (start_date <= $3 OR start_date IS NULL)",
            &[&spotter_id, &start, &end],
        )?;
        Ok(rows
            .iter()
            .map(|row| ExclusionWindow {
                spotter_id: row.get("spotter_id"),
                start: row.get("start_date"),
                end: row.get("end_date"),
            })
            .collect())
    }

    fn satellite_temperature_history(
        &self,
        site_id: i32,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<(NaiveDate, f64)>, StoreError> {
        let rows = self.client()?.query(
            "SELECT date, satellite_temperature FROM daily_data \
             WHERE reef_id = $1 AND date BETWEEN $2 AND $3 \
             AND satellite_temperature IS NOT NULL ORDER BY date",
            &[&site_id, &start, &end],
        )?;
        Ok(rows.iter().map(|row| (row.get(0), row.get(1))).collect())
    }

    fn latest_daily_date(&self, site_id: i32) -> Result<Option<NaiveDate>, StoreError> {
        let row = self
            .client()?
            .query_one("SELECT MAX(date) FROM daily_data WHERE reef_id = $1", &[&site_id])?;
        Ok(row.get(0))
    }

    fn upsert_daily_summary(&self, summary: &DailySummary) -> Result<UpsertOutcome, StoreError> {
        let sql = upsert_daily_sql();
        let row = self.client()?.query_one(sql.as_str(), &daily_params(summary))?;
        let inserted: bool = row.get("inserted");
        Ok(if inserted {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Updated
        })
    }

    fn insert_time_series_batch(&self, points: &[TimeSeriesPoint]) -> Result<usize, StoreError> {
        if points.is_empty() {
            return Ok(0);
        }

        let mut client = self.client()?;
        let mut transaction = client.transaction()?;
        let stmt = transaction.prepare(
            "INSERT INTO time_series (reef_id, source_id, metric, timestamp, value) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT ON CONSTRAINT no_duplicate_data DO NOTHING",
        )?;

        let mut inserted = 0;
        for point in points {
            let Some(value) = Decimal::from_f64_retain(point.value) else {
                warn!(
                    site_id = point.site_id,
                    metric = %point.metric,
                    value = point.value,
                    "skipping non-finite value"
                );
                continue;
            };
            let metric = point.metric.as_str();
            inserted += transaction.execute(
                &stmt,
                &[&point.site_id, &point.source_id, &metric, &point.timestamp, &value],
            )?;
        }
        transaction.commit()?;

        Ok(inserted as usize)
    }

    fn refresh_latest_data(&self) -> Result<(), StoreError> {
        self.client()?.batch_execute("REFRESH MATERIALIZED VIEW latest_data")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_sql_merges_every_value_column() {
        let sql = upsert_daily_sql();
        for column in DAILY_COLUMNS {
            let merge = format!("{column} = COALESCE(EXCLUDED.{column}, daily_data.{column})");
            assert!(sql.contains(&merge), "missing merge for {}", column);
        }
        assert!(sql.contains("ON CONFLICT ON CONSTRAINT no_duplicated_date"));
        assert!(sql.contains("$18)"), "expected 18 parameters: {}", sql);
    }

    #[test]
    fn test_daily_params_match_placeholder_count() {
        let summary = DailySummary::new(1, NaiveDate::from_ymd_opt(2020, 7, 7).unwrap());
        assert_eq!(daily_params(&summary).len(), DAILY_COLUMNS.len() + 2);
    }

    #[test]
    #[ignore] // Only run when database is available
    fn test_upsert_round_trip_against_database() {
        let client = crate::db::connect_and_verify(&REQUIRED_TABLES).expect("database");
        let gateway = PgGateway::new(client);
        let sites = gateway.find_sites(&[]).expect("reef query");
        let Some(site) = sites.first() else { return };

        let date = NaiveDate::from_ymd_opt(1999, 1, 1).unwrap();
        let mut first = DailySummary::new(site.id, date);
        first.surface_temperature = Some(27.0);
        gateway.upsert_daily_summary(&first).unwrap();

        let mut second = DailySummary::new(site.id, date);
        second.satellite_temperature = Some(27.5);
        assert_eq!(gateway.upsert_daily_summary(&second).unwrap(), UpsertOutcome::Updated);
    }
}

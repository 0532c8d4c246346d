/// reefmon_service: coral reef bleaching-risk monitoring service.
///
/// # Module structure
///
/// ```text
/// reefmon_service
/// ├── model       — shared data types (Site, SofarValue, DailySummary, Metric, …)
/// ├── config      — service configuration loader (reefmon.toml)
/// ├── logging     — tracing setup and provider failure classification
/// ├── db          — PostgreSQL connection and table validation
/// ├── ingest
/// │   ├── sofar   — Sofar model + spotter APIs: URL construction, JSON parsing, client
/// │   └── fixtures (test only) — representative API response payloads
/// ├── analysis
/// │   ├── reducers       — min/max/mean and closest-point selection over series
/// │   └── degree_heating — 84-day degree heating days with provider fallback
/// ├── alert
/// │   └── bleaching — NOAA Coral Reef Watch style alert levels
/// ├── store
/// │   ├── postgres — PersistenceGateway over PostgreSQL
/// │   └── memory   — in-process PersistenceGateway with the same conflict rules
/// ├── daily       — per-reef, per-day aggregation engine
/// ├── live        — current-conditions snapshot
/// ├── backfill    — bounded-pool orchestration over reefs and date ranges
/// └── daemon      — startup catch-up and the once-a-day update loop
/// ```

/// Public modules
pub mod alert;
pub mod analysis;
pub mod backfill;
pub mod config;
pub mod daemon;
pub mod daily;
pub mod db;
pub mod ingest;
pub mod live;
pub mod logging;
pub mod model;
pub mod store;

/// Service configuration loader - parses reefmon.toml
///
/// Keeps provider endpoints, pool sizes and live-data tolerance windows out
/// of the code. Every field has a default, so a missing section (or an empty
/// file) yields `ServiceConfig::default()`. Secrets are never read from this
/// file: the provider token and `DATABASE_URL` come from the environment.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "reefmon.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub provider: ProviderConfig,
    pub backfill: BackfillConfig,
    pub live: LiveConfig,
    pub daemon: DaemonConfig,
}

/// Sofar API access.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    /// Name of the environment variable holding the API token.
    pub token_env: String,
    pub timeout_seconds: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.sofarocean.com".to_string(),
            token_env: "SOFAR_API_TOKEN".to_string(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackfillConfig {
    /// Sites processed at once.
    pub concurrency: usize,
    /// Time-series rows per insert batch.
    pub batch_size: usize,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            batch_size: 1000,
        }
    }
}

/// How stale a "current" reading may be, per provider, in hours.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LiveConfig {
    pub sensor_tolerance_hours: f64,
    pub satellite_tolerance_hours: f64,
    pub degree_heating_tolerance_hours: f64,
    pub wave_tolerance_hours: f64,
    pub wind_tolerance_hours: f64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            sensor_tolerance_hours: 3.0,
            satellite_tolerance_hours: 72.0,
            degree_heating_tolerance_hours: 48.0,
            wave_tolerance_hours: 6.0,
            wind_tolerance_hours: 6.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    pub poll_interval_minutes: u64,
    /// How far back the startup catch-up reaches.
    pub backfill_days: i64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval_minutes: 60,
            backfill_days: 90,
        }
    }
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backfill.concurrency == 0 {
            return Err(ConfigError::Invalid("backfill.concurrency must be at least 1".into()));
        }
        if self.backfill.batch_size == 0 {
            return Err(ConfigError::Invalid("backfill.batch_size must be at least 1".into()));
        }
        if self.daemon.poll_interval_minutes == 0 {
            return Err(ConfigError::Invalid(
                "daemon.poll_interval_minutes must be at least 1".into(),
            ));
        }
        if self.daemon.backfill_days < 1 {
            return Err(ConfigError::Invalid("daemon.backfill_days must be at least 1".into()));
        }
        Ok(())
    }
}

/// Parses and validates a configuration document.
pub fn parse_config(contents: &str, path: &str) -> Result<ServiceConfig, ConfigError> {
    let config: ServiceConfig = toml::from_str(contents).map_err(|source| ConfigError::Parse {
        path: path.to_string(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

/// Loads the configuration at `path`. A missing file at the default
/// location is not an error; defaults are used.
pub fn load_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let display = path.display().to_string();
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && display == DEFAULT_CONFIG_PATH => {
            return Ok(ServiceConfig::default());
        }
        Err(source) => return Err(ConfigError::Read { path: display, source }),
    };
    parse_config(&contents, &display)
}

/// Structured logging for the reef monitoring service
///
/// Subscriber setup for the binaries plus the failure classification used
/// when a provider call or a site's pipeline fails. Everything else logs
/// through the `tracing` macros directly with `site_id` / `date` / `metric`
/// fields.

use std::fmt;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::ingest::ProviderError;

/// Installs the global subscriber. `RUST_LOG` wins when set; otherwise the
/// crate logs at info (debug with `verbose`) and dependencies at warn.
pub fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "reefmon_service=debug,warn"
    } else {
        "reefmon_service=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // A second init (tests, embedded use) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init();
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Provider has nothing for this point or window; normal for sparse models.
    Expected,
    /// Upstream rejected the request or changed its format.
    Unexpected,
    /// Network trouble; the next run will likely succeed.
    Transient,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Transient => write!(f, "TRANSIENT"),
        }
    }
}

pub fn classify_provider_failure(err: &ProviderError) -> FailureType {
    if err.is_retryable() {
        return FailureType::Transient;
    }
    match err {
        // 404 is what the model endpoints answer for points off their grid.
        ProviderError::Rejected { status: 404, .. } => FailureType::Expected,
        _ => FailureType::Unexpected,
    }
}

/// Logs a provider failure at the level its classification calls for.
pub fn log_provider_failure(site_id: i32, operation: &str, err: &ProviderError) {
    let failure_type = classify_provider_failure(err);
    match failure_type {
        FailureType::Expected => {
            debug!(site_id, operation, %failure_type, error = %err, "provider call failed")
        }
        FailureType::Unexpected => {
            error!(site_id, operation, %failure_type, error = %err, "provider call failed")
        }
        FailureType::Transient => {
            warn!(site_id, operation, %failure_type, error = %err, "provider call failed")
        }
    }
}

// ---------------------------------------------------------------------------
// Backfill Summary Logging
// ---------------------------------------------------------------------------

/// One line per run: info when nothing failed, error when everything did.
pub fn log_backfill_summary(label: &str, total: usize, successful: usize, failed: usize) {
    if failed == 0 {
        info!("{} complete: {}/{} successful, {} failed", label, successful, total, failed);
    } else if successful == 0 {
        error!("{} complete: {}/{} successful, {} failed", label, successful, total, failed);
    } else {
        warn!("{} complete: {}/{} successful, {} failed", label, successful, total, failed);
    }
}

// src/observability/mod.rs
//! Tracing setup and metric names
//!
//! The library only emits through the `tracing` and `metrics` facades; the
//! embedding application decides where output goes. `init_tracing` is a
//! convenience for binaries.

use crate::utils::config::LoggingConfig;
use crate::utils::errors::{ContinuumError, Result};
use tracing_subscriber::EnvFilter;

pub const RECORDS_WRITTEN: &str = "continuum_records_written_total";
pub const RECORDS_READ: &str = "continuum_records_read_total";
pub const TASKS_EXECUTED: &str = "continuum_tasks_executed_total";
pub const TASK_FAILURES: &str = "continuum_task_failures_total";
pub const RECORDS_FILTERED: &str = "continuum_records_filtered_total";

/// Install a global fmt subscriber.
///
/// `RUST_LOG` wins over `config.filter` when set.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| ContinuumError::Config(format!("Invalid log filter: {}", e)))?;

    let result = if config.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
    };

    result.map_err(|e| ContinuumError::Config(format!("Failed to install subscriber: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_rejected() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }

        let config = LoggingConfig {
            filter: "continuum=notalevel".to_string(),
            json: false,
        };
        assert!(init_tracing(&config).is_err());
    }
}

// src/utils/config.rs
//! Layered configuration: defaults, optional file, `CONTINUUM__*` environment

use crate::utils::errors::{ContinuumError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContinuumConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Playback scheduler tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Initial playback speed (1.0 = recorded speed)
    pub speed: f64,

    /// How far ahead of a due task the loop wakes (milliseconds)
    pub wake_lead_ms: u64,

    /// Below this distance to the next task the loop polls instead of sleeping
    pub sleep_threshold_ms: u64,

    /// Poll interval while paused (milliseconds)
    pub idle_poll_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            wake_lead_ms: 2,
            sleep_threshold_ms: 10,
            idle_poll_ms: 10,
        }
    }
}

impl SchedulerConfig {
    pub fn wake_lead(&self) -> Duration {
        Duration::from_millis(self.wake_lead_ms)
    }

    pub fn sleep_threshold(&self) -> Duration {
        Duration::from_millis(self.sleep_threshold_ms)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    /// Validate scheduler settings
    pub fn validate(&self) -> Result<()> {
        if self.wake_lead_ms >= self.sleep_threshold_ms {
            return Err(ContinuumError::Config(format!(
                "wake_lead_ms ({}) must be smaller than sleep_threshold_ms ({})",
                self.wake_lead_ms, self.sleep_threshold_ms
            )));
        }

        if self.idle_poll_ms == 0 {
            return Err(ContinuumError::Config(
                "idle_poll_ms cannot be 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Logging output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set
    pub filter: String,

    /// Emit JSON lines instead of human readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl ContinuumConfig {
    /// Load configuration, optionally layering a file over the defaults.
    ///
    /// Environment variables such as `CONTINUUM__SCHEDULER__SPEED=2` override
    /// both.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = Self::default();

        let mut builder = Config::builder()
            .set_default("scheduler.speed", defaults.scheduler.speed)?
            .set_default("scheduler.wake_lead_ms", defaults.scheduler.wake_lead_ms as i64)?
            .set_default(
                "scheduler.sleep_threshold_ms",
                defaults.scheduler.sleep_threshold_ms as i64,
            )?
            .set_default("scheduler.idle_poll_ms", defaults.scheduler.idle_poll_ms as i64)?
            .set_default("logging.filter", defaults.logging.filter.clone())?
            .set_default("logging.json", defaults.logging.json)?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config: ContinuumConfig = builder
            .add_source(
                Environment::with_prefix("CONTINUUM")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.scheduler.validate()
    }
}

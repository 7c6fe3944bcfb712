// src/utils/mod.rs
//! Shared error and configuration types

pub mod config;
pub mod errors;

pub use config::{ContinuumConfig, LoggingConfig, SchedulerConfig};
pub use errors::{ContinuumError, Result};

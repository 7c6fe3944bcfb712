// src/utils/errors.rs
//! Error taxonomy for capture, registry and playback operations

use thiserror::Error;
use uuid::Uuid;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, ContinuumError>;

/// Errors raised by Continuum
#[derive(Error, Debug)]
pub enum ContinuumError {
    /// Bad signature, empty type table or unreadable header. Fatal at open.
    #[error("Invalid capture format: {0}")]
    Format(String),

    /// A frame could not be decoded from the channel
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    /// No codec is registered for the type identity
    #[error("No codec registered for type {0}")]
    UnregisteredCodec(Uuid),

    /// Position assignment past the known record count
    #[error("Position {requested} is outside the range of valid values (count {count})")]
    SeekOutOfRange { requested: u64, count: u64 },

    #[error("Type {0} is already registered")]
    DuplicateCodec(Uuid),

    #[error("Compact code space exhausted")]
    CodeSpaceExhausted,

    /// Operation not permitted by the stream's access mode or lifecycle
    #[error("Stream access denied: {0}")]
    StreamAccess(String),

    /// A type codec failed to materialize or execute a record
    #[error("Codec failure: {0}")]
    Codec(String),

    #[error("Byte channel is closed")]
    ChannelClosed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for ContinuumError {
    fn from(err: config::ConfigError) -> Self {
        ContinuumError::Config(err.to_string())
    }
}

impl ContinuumError {
    /// Errors that mean the container itself cannot be trusted
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            ContinuumError::Format(_) | ContinuumError::CorruptRecord(_)
        )
    }
}

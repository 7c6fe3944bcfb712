// src/codec/mod.rs
//! Type codecs and decoded records
//!
//! A type codec is supplied by the caller for every kind of record it wants
//! to capture or replay. The container only knows payload bytes; the codec
//! turns those bytes into a [`DecodedRecord`] and performs the playback side
//! effect in [`TypeCodec::execute`].
//!
//! - **TypeCodec**: materialize + execute capability for one type identity
//! - **TypeRegistry**: identity → (codec, compact code) mapping

pub mod registry;

pub use registry::TypeRegistry;

use crate::utils::errors::{ContinuumError, Result};
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// In-memory form of one record frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRecord {
    /// Identity of the codec that owns this record
    pub type_id: Uuid,

    /// Opaque payload bytes
    pub payload: Bytes,

    /// Absolute timestamp
    pub timestamp: DateTime<Utc>,

    /// Timestamp minus container creation time
    pub offset: Duration,

    /// Declared payload length of the frame this record was decoded from
    pub frame_len: u32,
}

impl DecodedRecord {
    /// A record ready to be written; offset and frame length are filled in on read
    pub fn new(type_id: Uuid, payload: impl Into<Bytes>, timestamp: DateTime<Utc>) -> Self {
        let payload = payload.into();
        Self {
            type_id,
            frame_len: payload.len() as u32,
            payload,
            timestamp,
            offset: Duration::zero(),
        }
    }

    pub fn with_offset(mut self, offset: Duration) -> Self {
        self.offset = offset;
        self
    }
}

/// Caller-supplied capability for one record type
pub trait TypeCodec: Send + Sync {
    /// Stable identity, shared across containers
    fn type_id(&self) -> Uuid;

    /// Build a record from a decoded frame
    fn materialize(
        &self,
        payload: Bytes,
        timestamp: DateTime<Utc>,
        offset: Duration,
    ) -> Result<DecodedRecord> {
        Ok(DecodedRecord::new(self.type_id(), payload, timestamp).with_offset(offset))
    }

    /// Apply the record during playback
    fn execute(&self, record: &DecodedRecord) -> Result<()>;
}

/// Stand-in that lets a writer allocate a code for an identity whose real
/// codec is not loaded. Fails on materialize and execute.
#[derive(Debug, Clone)]
pub struct PlaceholderCodec {
    type_id: Uuid,
}

impl PlaceholderCodec {
    pub fn new(type_id: Uuid) -> Self {
        Self { type_id }
    }
}

impl TypeCodec for PlaceholderCodec {
    fn type_id(&self) -> Uuid {
        self.type_id
    }

    fn materialize(&self, _: Bytes, _: DateTime<Utc>, _: Duration) -> Result<DecodedRecord> {
        Err(ContinuumError::Codec(format!(
            "No codec installed for type {}",
            self.type_id
        )))
    }

    fn execute(&self, _: &DecodedRecord) -> Result<()> {
        Err(ContinuumError::Codec(format!(
            "No codec installed for type {}",
            self.type_id
        )))
    }
}

// src/recording/recorder.rs
//! Recorders: sources of timestamped records for one type identity

use crate::codec::DecodedRecord;
use crate::recording::buffer::RecordBuffer;
use crate::utils::errors::Result;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace};
use uuid::Uuid;

/// Captures state changes of one type into a buffer while started
pub trait StateRecorder: Send + Sync {
    /// Identity of the codec that understands this recorder's payloads
    fn type_id(&self) -> Uuid;

    fn buffer(&self) -> &RecordBuffer;

    fn start(&self) -> Result<()>;

    fn stop(&self);

    fn is_started(&self) -> bool;
}

/// Stock recorder: callers push payloads, stamped on arrival
pub struct BufferedRecorder {
    type_id: Uuid,
    buffer: RecordBuffer,
    started: AtomicBool,
}

impl BufferedRecorder {
    pub fn new(type_id: Uuid) -> Self {
        Self {
            type_id,
            buffer: RecordBuffer::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Record a payload stamped now. Ignored (returns false) while stopped.
    pub fn record(&self, payload: impl Into<Bytes>) -> bool {
        self.record_at(payload, Utc::now())
    }

    /// Record a payload with an explicit timestamp
    pub fn record_at(&self, payload: impl Into<Bytes>, timestamp: DateTime<Utc>) -> bool {
        if !self.is_started() {
            trace!("Recorder {} stopped, payload dropped", self.type_id);
            return false;
        }

        self.buffer
            .enqueue(DecodedRecord::new(self.type_id, payload, timestamp));
        true
    }
}

impl StateRecorder for BufferedRecorder {
    fn type_id(&self) -> Uuid {
        self.type_id
    }

    fn buffer(&self) -> &RecordBuffer {
        &self.buffer
    }

    fn start(&self) -> Result<()> {
        self.started.store(true, Ordering::SeqCst);
        debug!("Recorder {} started", self.type_id);
        Ok(())
    }

    fn stop(&self) {
        self.started.store(false, Ordering::SeqCst);
        debug!("Recorder {} stopped", self.type_id);
    }

    fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

// src/recording/buffer.rs
//! FIFO record buffer
//!
//! Recorders push records here as state changes; the capture service drains
//! them with `try_dequeue` on every flush.

use crate::codec::DecodedRecord;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unbounded multi-producer record queue
#[derive(Default)]
pub struct RecordBuffer {
    queue: Mutex<VecDeque<DecodedRecord>>,

    /// Enqueue counter
    enqueued: AtomicU64,

    /// Dequeue counter
    dequeued: AtomicU64,
}

impl RecordBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, record: DecodedRecord) {
        self.queue.lock().push_back(record);
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Take the oldest record (non-blocking)
    pub fn try_dequeue(&self) -> Option<DecodedRecord> {
        let record = self.queue.lock().pop_front()?;
        self.dequeued.fetch_add(1, Ordering::Relaxed);
        Some(record)
    }

    /// Copy of the oldest record, left in place
    pub fn try_peek(&self) -> Option<DecodedRecord> {
        self.queue.lock().front().cloned()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
            current_size: self.len(),
        }
    }
}

/// Buffer statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Total records enqueued
    pub enqueued: u64,

    /// Total records dequeued
    pub dequeued: u64,

    /// Records currently waiting
    pub current_size: usize,
}

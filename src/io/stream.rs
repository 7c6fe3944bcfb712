// src/io/stream.rs
//! Capture stream: a reader and/or writer sharing one channel
//!
//! The channel has a single physical cursor; the stream keeps a logical read
//! cursor and a logical write cursor and swaps the right one in under its own
//! lock for every operation.
//!
//! ```text
//!              ┌──────────── CaptureStream lock ────────────┐
//! read()  ──►  seek(read_cursor)  → reader.read()  → read_cursor  = position
//! write() ──►  seek(write_cursor) → writer.write() → write_cursor = position
//!              └────────────────────────────────────────────┘
//! ```

use crate::codec::{DecodedRecord, TypeRegistry};
use crate::io::channel::ByteChannel;
use crate::io::format::Version;
use crate::io::reader::CaptureReader;
use crate::io::writer::CaptureWriter;
use crate::utils::errors::{ContinuumError, Result};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// How a stream is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Parse an existing container
    Read,

    /// Start a new container
    Write,

    /// Start a new container and read it back while it grows
    ReadWrite,
}

struct StreamInner {
    reader: Option<CaptureReader>,
    writer: Option<CaptureWriter>,
    read_cursor: u64,
    write_cursor: u64,
}

pub struct CaptureStream {
    channel: Arc<ByteChannel>,
    registry: Arc<TypeRegistry>,
    mode: AccessMode,
    created: DateTime<Utc>,
    inner: Mutex<StreamInner>,
}

impl CaptureStream {
    /// Open a stream over `channel` starting at its current position
    pub fn open(
        channel: Arc<ByteChannel>,
        mode: AccessMode,
        registry: Arc<TypeRegistry>,
    ) -> Result<Self> {
        let (reader, writer) = match mode {
            AccessMode::Read => {
                let reader = CaptureReader::open(Arc::clone(&channel), Arc::clone(&registry))?;
                (Some(reader), None)
            }
            AccessMode::Write => {
                let writer = CaptureWriter::new(Arc::clone(&channel), Arc::clone(&registry));
                (None, Some(writer))
            }
            AccessMode::ReadWrite => {
                let start = channel.position()?;

                // the writer lays down the header the reader is about to parse
                let writer = CaptureWriter::new(Arc::clone(&channel), Arc::clone(&registry));
                channel.seek(start)?;
                let reader = CaptureReader::open(Arc::clone(&channel), Arc::clone(&registry))?;

                (Some(reader), Some(writer))
            }
        };

        let created = match (&reader, &writer) {
            (_, Some(writer)) => writer.created(),
            (Some(reader), None) => reader.created(),
            (None, None) => unreachable!("every access mode opens a reader or a writer"),
        };

        let cursor = channel.position()?;
        info!("Opened capture stream in {:?} mode", mode);

        Ok(Self {
            channel,
            registry,
            mode,
            created,
            inner: Mutex::new(StreamInner {
                reader,
                writer,
                read_cursor: cursor,
                write_cursor: cursor,
            }),
        })
    }

    /// Read the next record at the read cursor.
    ///
    /// A frame that is not fully available leaves the cursor on its first
    /// byte, so the read can be retried once the writer catches up.
    pub fn read(&self) -> Result<DecodedRecord> {
        let mut inner = self.inner.lock();
        let cursor = inner.read_cursor;
        let reader = inner.reader.as_mut().ok_or_else(not_readable)?;

        self.channel.seek(cursor)?;
        let consumed = reader.position();
        let result = reader.read();

        // A frame counted as consumed moves the cursor even if decoding failed
        if result.is_ok() || reader.position() != consumed {
            inner.read_cursor = self.channel.position()?;
        }
        result
    }

    /// Append a record at the write cursor
    pub fn write(&self, record: &DecodedRecord) -> Result<()> {
        let mut inner = self.inner.lock();
        let cursor = inner.write_cursor;
        let writer = inner.writer.as_mut().ok_or_else(not_writable)?;

        self.channel.seek(cursor)?;
        let result = writer.write(record);
        inner.write_cursor = self.channel.position()?;
        result
    }

    /// Next record at the read cursor, if one is fully available
    pub fn peek(&self) -> Result<Option<DecodedRecord>> {
        let inner = self.inner.lock();
        let reader = inner.reader.as_ref().ok_or_else(not_readable)?;

        self.channel.seek(inner.read_cursor)?;
        Ok(reader.peek())
    }

    /// Next record of `type_id` at or after the read cursor
    pub fn peek_type(&self, type_id: &Uuid) -> Result<Option<DecodedRecord>> {
        let inner = self.inner.lock();
        let reader = inner.reader.as_ref().ok_or_else(not_readable)?;

        self.channel.seek(inner.read_cursor)?;
        Ok(reader.peek_type(type_id))
    }

    /// Logical position: records consumed by the reader, or written by the
    /// writer for write-only streams
    pub fn position(&self) -> u64 {
        let inner = self.inner.lock();
        match (&inner.reader, &inner.writer) {
            (Some(reader), _) => reader.position(),
            (None, Some(writer)) => writer.position(),
            (None, None) => 0,
        }
    }

    /// Move the read position, replaying skipped records through their codecs
    pub fn set_position(&self, target: u64) -> Result<()> {
        let mut inner = self.inner.lock();
        let cursor = inner.read_cursor;
        let reader = inner.reader.as_mut().ok_or_else(not_readable)?;

        self.channel.seek(cursor)?;
        reader.refresh()?;
        let result = reader.set_position(target);
        inner.read_cursor = self.channel.position()?;

        debug!("Stream position set to {}", target);
        result
    }

    /// Records in the container
    pub fn count(&self) -> Result<u64> {
        let mut inner = self.inner.lock();
        if let Some(writer) = &inner.writer {
            return Ok(writer.count());
        }

        let reader = inner.reader.as_mut().ok_or_else(not_readable)?;
        reader.refresh()?;
        Ok(reader.count())
    }

    /// Offset of the most recently written record
    pub fn duration(&self) -> Result<Duration> {
        let mut inner = self.inner.lock();
        if let Some(writer) = &inner.writer {
            return Ok(writer.header().duration);
        }

        let reader = inner.reader.as_mut().ok_or_else(not_readable)?;
        reader.refresh()?;
        Ok(reader.duration())
    }

    pub fn version(&self) -> Version {
        let inner = self.inner.lock();
        match (&inner.writer, &inner.reader) {
            (Some(writer), _) => writer.header().version,
            (None, Some(reader)) => reader.header().version,
            (None, None) => crate::io::format::CURRENT_VERSION,
        }
    }

    /// Type identities in the container's table; empty for write-only streams
    pub fn codecs(&self) -> Vec<Uuid> {
        self.inner
            .lock()
            .reader
            .as_ref()
            .map(|reader| reader.type_ids())
            .unwrap_or_default()
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn can_read(&self) -> bool {
        self.inner.lock().reader.is_some() && !self.channel.is_closed()
    }

    pub fn can_write(&self) -> bool {
        self.inner.lock().writer.is_some() && !self.channel.is_closed()
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn flush(&self) -> Result<()> {
        let _inner = self.inner.lock();
        self.channel.flush()
    }

    /// Flush and close the underlying channel
    pub fn close(&self) {
        let _inner = self.inner.lock();
        let _ = self.channel.flush();
        self.channel.close();
    }
}

fn not_readable() -> ContinuumError {
    ContinuumError::StreamAccess("Cannot read from underlying stream".to_string())
}

fn not_writable() -> ContinuumError {
    ContinuumError::StreamAccess("Cannot write to underlying stream".to_string())
}

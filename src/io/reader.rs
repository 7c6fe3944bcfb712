// src/io/reader.rs
//! Sequential / seek-by-replay capture reader
//!
//! Seeking is not side-effect free: every record skipped while moving the
//! logical position forward is handed to its codec's `execute`, so playback
//! state stays consistent with what a sequential reader would have produced.

use crate::codec::{DecodedRecord, TypeRegistry};
use crate::io::channel::ByteChannel;
use crate::io::format::{
    self, CaptureHeader, FrameHeader, COUNT_OFFSET, FRAME_HEADER_LEN, HEADER_LEN, TABLE_ENTRY_LEN,
};
use crate::observability::RECORDS_READ;
use crate::utils::errors::{ContinuumError, Result};
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};
use uuid::Uuid;

pub struct CaptureReader {
    channel: Arc<ByteChannel>,
    registry: Arc<TypeRegistry>,
    header: CaptureHeader,
    table: HashMap<i16, Uuid>,

    /// Absolute offset of the container start
    origin: u64,

    /// Absolute offset of the first frame
    first_frame: u64,

    /// Records consumed so far
    position: u64,
}

impl CaptureReader {
    /// Parse header and type table at the channel's current position.
    ///
    /// Any failure closes the channel and is reported as a format error.
    pub fn open(channel: Arc<ByteChannel>, registry: Arc<TypeRegistry>) -> Result<Self> {
        match Self::parse(&channel) {
            Ok((header, table, origin, first_frame)) => {
                debug!(
                    "Opened capture v{} with {} records, {} types",
                    header.version,
                    header.count,
                    table.len()
                );

                Ok(Self {
                    channel,
                    registry,
                    header,
                    table,
                    origin,
                    first_frame,
                    position: 0,
                })
            }
            Err(e) => {
                warn!("Rejecting capture: {}", e);
                channel.close();
                Err(match e {
                    ContinuumError::Format(msg) => ContinuumError::Format(msg),
                    other => ContinuumError::Format(format!(
                        "Stream does not contain a valid continuum header: {}",
                        other
                    )),
                })
            }
        }
    }

    fn parse(channel: &ByteChannel) -> Result<(CaptureHeader, HashMap<i16, Uuid>, u64, u64)> {
        let origin = channel.position()?;

        let mut fixed = [0u8; HEADER_LEN];
        channel.read_exact(&mut fixed)?;
        let (header, table_len) = format::decode_header(&fixed)?;

        let remaining = channel.remaining()?;
        if table_len as u64 * TABLE_ENTRY_LEN as u64 > remaining {
            return Err(ContinuumError::Format(format!(
                "Type table of {} entries does not fit in {} remaining bytes",
                table_len, remaining
            )));
        }

        let mut table = HashMap::with_capacity(table_len);
        let mut entry = [0u8; TABLE_ENTRY_LEN];
        for _ in 0..table_len {
            channel.read_exact(&mut entry)?;
            let (code, type_id) = format::decode_table_entry(&entry);
            table.insert(code, type_id);
        }

        let first_frame = channel.position()?;
        Ok((header, table, origin, first_frame))
    }

    /// Decode the next frame and advance the position by one
    pub fn read(&mut self) -> Result<DecodedRecord> {
        let frame = self.read_frame_header().map_err(|e| match e {
            ContinuumError::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
                ContinuumError::CorruptRecord("Truncated frame header".to_string())
            }
            other => other,
        })?;

        let remaining = self.channel.remaining()?;
        if frame.payload_len < 0 || frame.payload_len as u64 > remaining {
            return Err(ContinuumError::CorruptRecord(format!(
                "Invalid length {} specified in header of record ({} bytes remain)",
                frame.payload_len, remaining
            )));
        }

        let payload = self.read_payload(frame.payload_len as usize)?;
        self.position += 1;

        let type_id = *self.table.get(&frame.code).ok_or_else(|| {
            ContinuumError::CorruptRecord(format!(
                "Unexpected type code {} encountered",
                frame.code
            ))
        })?;

        let offset = self.header.offset_of(frame.timestamp);
        if offset < Duration::zero() {
            warn!(
                "Record {} precedes the capture start by {}",
                self.position, -offset
            );
        }

        let record = self.materialize(type_id, &frame, payload, offset)?;
        metrics::counter!(RECORDS_READ).increment(1);
        Ok(record)
    }

    fn read_frame_header(&self) -> Result<FrameHeader> {
        let mut fixed = [0u8; FRAME_HEADER_LEN];
        self.channel.read_exact(&mut fixed)?;
        Ok(format::decode_frame_header(&fixed))
    }

    fn read_payload(&self, len: usize) -> Result<Bytes> {
        let mut payload = vec![0u8; len];
        self.channel.read_exact(&mut payload)?;
        Ok(Bytes::from(payload))
    }

    fn materialize(
        &self,
        type_id: Uuid,
        frame: &FrameHeader,
        payload: Bytes,
        offset: Duration,
    ) -> Result<DecodedRecord> {
        let codec = self
            .registry
            .find(&type_id)
            .ok_or(ContinuumError::UnregisteredCodec(type_id))?;

        let mut record = codec.materialize(payload, frame.timestamp, offset)?;
        record.frame_len = frame.payload_len as u32;
        Ok(record)
    }

    /// Next decodable record without moving the cursor.
    ///
    /// Returns `None` when the tail is incomplete, which is how a reader
    /// tails a container that is still being appended to. Decode failures are
    /// also reported as `None`.
    pub fn peek(&self) -> Option<DecodedRecord> {
        self.peek_matching(None)
    }

    /// Next decodable record of the given type without moving the cursor
    pub fn peek_type(&self, type_id: &Uuid) -> Option<DecodedRecord> {
        self.peek_matching(Some(type_id))
    }

    fn peek_matching(&self, filter: Option<&Uuid>) -> Option<DecodedRecord> {
        let start = match self.channel.position() {
            Ok(position) => position,
            Err(e) => {
                trace!("Peek unavailable: {}", e);
                return None;
            }
        };

        let result = self.scan_ahead(filter);

        if let Err(e) = self.channel.seek(start) {
            warn!("Failed to restore cursor after peek: {}", e);
        }

        match result {
            Ok(found) => found,
            Err(e) => {
                trace!("Peek suppressed error: {}", e);
                None
            }
        }
    }

    /// `Ok(None)` means the tail is not complete yet
    fn scan_ahead(&self, filter: Option<&Uuid>) -> Result<Option<DecodedRecord>> {
        loop {
            if self.channel.remaining()? < FRAME_HEADER_LEN as u64 {
                return Ok(None);
            }

            let frame = self.read_frame_header()?;
            if frame.payload_len < 0 || frame.payload_len as u64 > self.channel.remaining()? {
                return Ok(None);
            }

            let payload = self.read_payload(frame.payload_len as usize)?;

            let Some(type_id) = self.table.get(&frame.code).copied() else {
                continue;
            };

            if filter.is_some_and(|wanted| *wanted != type_id) {
                continue;
            }

            let Some(codec) = self.registry.find(&type_id) else {
                continue;
            };

            let offset = self.header.offset_of(frame.timestamp);
            let mut record = codec.materialize(payload, frame.timestamp, offset)?;
            record.frame_len = frame.payload_len as u32;
            return Ok(Some(record));
        }
    }

    /// Move the logical position, replaying records through their codecs
    pub fn set_position(&mut self, target: u64) -> Result<()> {
        if target == self.position {
            return Ok(());
        }

        if target > self.header.count {
            return Err(ContinuumError::SeekOutOfRange {
                requested: target,
                count: self.header.count,
            });
        }

        if target < self.position {
            debug!("Rewinding capture from {} to {}", self.position, target);
            self.channel.seek(self.first_frame)?;
            self.position = 0;
        }

        while self.position < target {
            let record = self.read()?;
            let codec = self
                .registry
                .find(&record.type_id)
                .ok_or(ContinuumError::UnregisteredCodec(record.type_id))?;
            codec.execute(&record)?;
        }

        Ok(())
    }

    /// Re-read the in-place count and duration fields, keeping the cursor.
    ///
    /// Lets a tailing reader see frames appended after it was opened.
    pub fn refresh(&mut self) -> Result<()> {
        let current = self.channel.position()?;
        let result = self.read_counters();
        self.channel.seek(current)?;

        let (count, duration) = result?;
        self.header.count = count;
        self.header.duration = duration;
        Ok(())
    }

    fn read_counters(&self) -> Result<(u64, Duration)> {
        self.channel.seek(self.origin + COUNT_OFFSET)?;
        let mut raw = [0u8; 16];
        self.channel.read_exact(&mut raw)?;

        let mut count = [0u8; 8];
        count.copy_from_slice(&raw[..8]);
        let mut duration = [0u8; 8];
        duration.copy_from_slice(&raw[8..]);

        Ok((
            i64::from_le_bytes(count).max(0) as u64,
            format::ticks_to_duration(i64::from_le_bytes(duration)),
        ))
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn header(&self) -> &CaptureHeader {
        &self.header
    }

    pub fn count(&self) -> u64 {
        self.header.count
    }

    pub fn duration(&self) -> Duration {
        self.header.duration
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.header.created
    }

    /// Type identities listed in the container's table, ordered by code
    pub fn type_ids(&self) -> Vec<Uuid> {
        let mut entries: Vec<(&i16, &Uuid)> = self.table.iter().collect();
        entries.sort_by_key(|(code, _)| **code);
        entries.into_iter().map(|(_, id)| *id).collect()
    }

    pub fn channel(&self) -> &Arc<ByteChannel> {
        &self.channel
    }
}

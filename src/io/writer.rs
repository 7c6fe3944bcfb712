// src/io/writer.rs
//! Sequential capture writer
//!
//! Writes the header and a snapshot of the registry as the type table at
//! construction, then appends one frame per `write`, rewriting the count and
//! duration fields in place after every frame.

use crate::codec::{DecodedRecord, TypeRegistry};
use crate::io::channel::ByteChannel;
use crate::io::format::{self, CaptureHeader, COUNT_OFFSET, DURATION_OFFSET};
use crate::observability::RECORDS_WRITTEN;
use crate::utils::errors::{ContinuumError, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, trace, warn};
use uuid::Uuid;

pub struct CaptureWriter {
    channel: Arc<ByteChannel>,
    registry: Arc<TypeRegistry>,
    header: CaptureHeader,
    table: Vec<(i16, Uuid)>,

    /// Frames written by this writer
    position: u64,

    /// Absolute offsets of the in-place counters; unset if the header write failed
    counter_offsets: Option<(u64, u64)>,
}

impl CaptureWriter {
    /// Start a new container at the channel's current position, stamped now
    pub fn new(channel: Arc<ByteChannel>, registry: Arc<TypeRegistry>) -> Self {
        Self::create_at(channel, registry, Utc::now())
    }

    /// Start a new container with an explicit creation time.
    ///
    /// Never fails: if the header cannot be written the writer is returned
    /// uninitialized and every later `write` reports a format error.
    pub fn create_at(
        channel: Arc<ByteChannel>,
        registry: Arc<TypeRegistry>,
        created: DateTime<Utc>,
    ) -> Self {
        let header = CaptureHeader::new(created);
        let table = registry.allocation_table();

        let mut writer = Self {
            channel,
            registry,
            header,
            table,
            position: 0,
            counter_offsets: None,
        };

        match writer.write_header() {
            Ok(offsets) => {
                debug!(
                    "Capture header written with {} type table entries",
                    writer.table.len()
                );
                writer.counter_offsets = Some(offsets);
            }
            Err(e) => warn!("Failed to write capture header: {}", e),
        }

        writer
    }

    fn write_header(&self) -> Result<(u64, u64)> {
        let start = self.channel.position()?;
        let bytes = format::encode_header(&self.header, &self.table)?;
        self.channel.write_all(&bytes)?;
        Ok((start + COUNT_OFFSET, start + DURATION_OFFSET))
    }

    /// Append one record at the channel's current position
    pub fn write(&mut self, record: &DecodedRecord) -> Result<()> {
        let code = self
            .registry
            .allocated_code(&record.type_id)
            .ok_or(ContinuumError::UnregisteredCodec(record.type_id))?;

        let (count_offset, duration_offset) = self.counter_offsets.ok_or_else(|| {
            ContinuumError::Format("Capture header was never written".to_string())
        })?;

        let timestamp = record.timestamp.max(self.header.created);
        // Encoded before anything touches the channel so a rejected record leaves no bytes
        let frame = format::encode_frame(code, timestamp, &record.payload)?;
        self.channel.write_all(&frame)?;

        self.position += 1;
        self.header.count += 1;
        self.header.duration = self.header.offset_of(timestamp);

        let append_position = self.channel.position()?;
        self.channel.seek(count_offset)?;
        self.channel.write_all(&format::encode_count(self.header.count))?;
        self.channel.seek(duration_offset)?;
        self.channel
            .write_all(&format::encode_duration(self.header.duration))?;
        self.channel.seek(append_position)?;

        metrics::counter!(RECORDS_WRITTEN).increment(1);
        trace!(
            "Wrote frame {} (code {}, {} bytes)",
            self.header.count,
            code,
            record.payload.len()
        );

        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.channel.flush()
    }

    pub fn is_initialized(&self) -> bool {
        self.counter_offsets.is_some()
    }

    pub fn header(&self) -> &CaptureHeader {
        &self.header
    }

    pub fn count(&self) -> u64 {
        self.header.count
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.header.created
    }

    /// Type table written into this container
    pub fn table(&self) -> &[(i16, Uuid)] {
        &self.table
    }

    pub fn channel(&self) -> &Arc<ByteChannel> {
        &self.channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::testing::RecordingCodec;
    use crate::codec::TypeCodec;
    use crate::io::format::{decode_header, FRAME_HEADER_LEN, HEADER_LEN, TABLE_ENTRY_LEN};
    use chrono::{Duration, TimeZone};

    fn setup() -> (Arc<ByteChannel>, Arc<TypeRegistry>, Uuid) {
        let registry = Arc::new(TypeRegistry::new());
        let codec = Arc::new(RecordingCodec::random());
        let id = codec.type_id();
        registry.add(codec).unwrap();
        (Arc::new(ByteChannel::in_memory()), registry, id)
    }

    fn created() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_header_written_on_create() {
        let (channel, registry, _) = setup();
        let writer = CaptureWriter::create_at(Arc::clone(&channel), registry, created());

        assert!(writer.is_initialized());
        assert_eq!(writer.count(), 0);
        assert_eq!(
            channel.len().unwrap(),
            (HEADER_LEN + TABLE_ENTRY_LEN) as u64
        );
    }

    #[test]
    fn test_counters_updated_in_place() {
        let (channel, registry, id) = setup();
        let mut writer = CaptureWriter::create_at(Arc::clone(&channel), registry, created());

        for i in 1..=3 {
            let record = DecodedRecord::new(id, vec![i as u8; 4], created() + Duration::seconds(i));
            writer.write(&record).unwrap();
        }

        assert_eq!(writer.count(), 3);
        assert_eq!(writer.position(), 3);

        let bytes = channel.snapshot().unwrap();
        let (header, _) = decode_header(&bytes).unwrap();
        assert_eq!(header.count, 3);
        assert_eq!(header.duration, Duration::seconds(3));

        // append cursor restored after the counter rewrite
        assert_eq!(channel.position().unwrap(), bytes.len() as u64);
        assert_eq!(
            bytes.len(),
            HEADER_LEN + TABLE_ENTRY_LEN + 3 * (FRAME_HEADER_LEN + 4)
        );
    }

    #[test]
    fn test_unregistered_type_rejected() {
        let (channel, registry, _) = setup();
        let mut writer = CaptureWriter::create_at(channel, registry, created());
        let stranger = Uuid::new_v4();

        let result = writer.write(&DecodedRecord::new(stranger, vec![1u8], created()));
        assert!(matches!(result, Err(ContinuumError::UnregisteredCodec(id)) if id == stranger));
        assert_eq!(writer.count(), 0);
    }

    #[test]
    fn test_early_timestamp_clamped() {
        let (channel, registry, id) = setup();
        let mut writer = CaptureWriter::create_at(Arc::clone(&channel), registry, created());

        let early = DecodedRecord::new(id, vec![7u8], created() - Duration::hours(1));
        writer.write(&early).unwrap();

        assert_eq!(writer.header().duration, Duration::zero());
        let bytes = channel.snapshot().unwrap();
        let frame_start = HEADER_LEN + TABLE_ENTRY_LEN;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[frame_start + 2..frame_start + 10]);
        assert_eq!(format::decode_timestamp(u64::from_le_bytes(raw)), created());
    }

    #[test]
    fn test_duration_is_last_offset_not_maximum() {
        let (channel, registry, id) = setup();
        let mut writer = CaptureWriter::create_at(channel, registry, created());

        writer
            .write(&DecodedRecord::new(id, vec![1u8], created() + Duration::seconds(10)))
            .unwrap();
        writer
            .write(&DecodedRecord::new(id, vec![2u8], created() + Duration::seconds(4)))
            .unwrap();

        assert_eq!(writer.header().duration, Duration::seconds(4));
    }

    #[test]
    fn test_unrepresentable_timestamp_rejected() {
        let (channel, registry, id) = setup();
        let mut writer = CaptureWriter::create_at(Arc::clone(&channel), registry, created());
        writer.write(&DecodedRecord::new(id, vec![1u8], created())).unwrap();
        let before = channel.snapshot().unwrap();

        let far = Utc.with_ymd_and_hms(40_000, 1, 1, 0, 0, 0).unwrap();
        let result = writer.write(&DecodedRecord::new(id, vec![2u8], far));

        assert!(matches!(result, Err(ContinuumError::Format(_))));
        assert_eq!(writer.count(), 1);
        assert_eq!(writer.header().duration, Duration::zero());
        assert_eq!(channel.snapshot().unwrap(), before);
        assert_eq!(channel.position().unwrap(), before.len() as u64);
    }

    #[test]
    fn test_uninitialized_writer() {
        let (channel, registry, id) = setup();
        channel.close();

        let mut writer = CaptureWriter::create_at(channel, registry, created());
        assert!(!writer.is_initialized());

        let result = writer.write(&DecodedRecord::new(id, vec![1u8], created()));
        assert!(matches!(result, Err(ContinuumError::Format(_))));
    }
}

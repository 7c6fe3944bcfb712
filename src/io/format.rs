// src/io/format.rs
//! Container codec: byte-exact header, type table and record frame layout
//!
//! ```text
//! offset  size  field
//! 0       16    signature ("continuum" + 7 reserved zero bytes)
//! 16      4     version
//! 20      8     creation timestamp (ticks)
//! 28      8     record count            <- rewritten after every frame
//! 36      8     duration (ticks)        <- rewritten after every frame
//! 44      4     type table entries T
//! 48      18*T  [i16 compact code][16-byte type identity]
//! ...           frames: [i16 code][i64 timestamp][i32 length][payload]
//! ```
//!
//! All integers are little-endian. Nothing here owns a channel.

use crate::utils::errors::{ContinuumError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, Duration, Timelike, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

pub const SIGNATURE: [u8; 16] = [
    b'c', b'o', b'n', b't', b'i', b'n', b'u', b'u', b'm', 0, 0, 0, 0, 0, 0, 0,
];

pub const CURRENT_VERSION: Version = Version::new(2, 0, 0, 0);

pub const VERSION_OFFSET: u64 = 16;
pub const TIMESTAMP_OFFSET: u64 = 20;
pub const COUNT_OFFSET: u64 = 28;
pub const DURATION_OFFSET: u64 = 36;
pub const TABLE_LEN_OFFSET: u64 = 44;

/// Fixed part of the header, up to and including the table entry count
pub const HEADER_LEN: usize = 48;
pub const TABLE_ENTRY_LEN: usize = 18;
pub const FRAME_HEADER_LEN: usize = 14;

/// 100-ns ticks between 0001-01-01T00:00:00Z and the Unix epoch
const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;
const TICKS_PER_SECOND: i64 = 10_000_000;
const NANOS_PER_TICK: i64 = 100;

/// Largest tick count that leaves the two kind bits free
const MAX_TICKS: i64 = (1 << 62) - 1;

/// Top two bits of a timestamp field carry the clock kind
const KIND_MASK: u64 = 0xC000_0000_0000_0000;
const KIND_UTC: u64 = 0x4000_0000_0000_0000;

/// Four-part container version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub build: u8,
    pub revision: u8,
}

impl Version {
    pub const fn new(major: u8, minor: u8, build: u8, revision: u8) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }

    pub fn to_bytes(self) -> [u8; 4] {
        [self.major, self.minor, self.build, self.revision]
    }

    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self::new(bytes[0], bytes[1], bytes[2], bytes[3])
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

/// Header values shared by readers and writers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureHeader {
    pub version: Version,

    /// Creation time, at tick precision
    pub created: DateTime<Utc>,

    /// Frames fully appended
    pub count: u64,

    /// Offset of the most recently written frame
    pub duration: Duration,
}

impl CaptureHeader {
    /// Fresh header for a container created at `created`
    pub fn new(created: DateTime<Utc>) -> Self {
        Self {
            version: CURRENT_VERSION,
            created: truncate_to_tick(created),
            count: 0,
            duration: Duration::zero(),
        }
    }

    /// Offset of `timestamp` from the container start
    pub fn offset_of(&self, timestamp: DateTime<Utc>) -> Duration {
        timestamp - self.created
    }
}

/// Decoded fixed part of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub code: i16,
    pub timestamp: DateTime<Utc>,
    pub payload_len: i32,
}

/// Encode the header followed by the type table
pub fn encode_header(header: &CaptureHeader, table: &[(i16, Uuid)]) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + table.len() * TABLE_ENTRY_LEN);

    buf.put_slice(&SIGNATURE);
    buf.put_slice(&header.version.to_bytes());
    buf.put_u64_le(encode_timestamp(header.created)?);
    buf.put_i64_le(header.count as i64);
    buf.put_i64_le(duration_to_ticks(header.duration));
    buf.put_i32_le(table.len() as i32);

    for (code, type_id) in table {
        buf.put_i16_le(*code);
        buf.put_slice(&type_id.to_bytes_le());
    }

    Ok(buf.freeze())
}

/// Decode the fixed header, returning it with the declared table length
pub fn decode_header(bytes: &[u8]) -> Result<(CaptureHeader, usize)> {
    if bytes.len() < HEADER_LEN {
        return Err(ContinuumError::Format(format!(
            "Header requires {} bytes, found {}",
            HEADER_LEN,
            bytes.len()
        )));
    }

    if bytes[..SIGNATURE.len()] != SIGNATURE {
        return Err(ContinuumError::Format(
            "Stream does not contain a valid continuum header".to_string(),
        ));
    }

    let mut buf = &bytes[SIGNATURE.len()..HEADER_LEN];

    let mut version = [0u8; 4];
    buf.copy_to_slice(&mut version);
    let created = decode_timestamp(buf.get_u64_le());
    let count = buf.get_i64_le();
    let duration = ticks_to_duration(buf.get_i64_le());
    let table_len = buf.get_i32_le();

    if table_len <= 0 {
        return Err(ContinuumError::Format(
            "Stream does not contain a valid type table".to_string(),
        ));
    }

    let header = CaptureHeader {
        version: Version::from_bytes(version),
        created,
        count: count.max(0) as u64,
        duration,
    };

    Ok((header, table_len as usize))
}

pub fn decode_table_entry(bytes: &[u8; TABLE_ENTRY_LEN]) -> (i16, Uuid) {
    let mut buf = &bytes[..];
    let code = buf.get_i16_le();
    let mut id = [0u8; 16];
    buf.copy_to_slice(&mut id);
    (code, Uuid::from_bytes_le(id))
}

/// Encode one frame. Fails for timestamps the tick clock cannot hold and
/// payloads longer than `i32::MAX`.
pub fn encode_frame(code: i16, timestamp: DateTime<Utc>, payload: &[u8]) -> Result<Bytes> {
    let raw = encode_timestamp(timestamp)?;
    let len = i32::try_from(payload.len()).map_err(|_| {
        ContinuumError::Format(format!("Payload of {} bytes is too large", payload.len()))
    })?;

    let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
    buf.put_i16_le(code);
    buf.put_u64_le(raw);
    buf.put_i32_le(len);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

pub fn decode_frame_header(bytes: &[u8; FRAME_HEADER_LEN]) -> FrameHeader {
    let mut buf = &bytes[..];
    FrameHeader {
        code: buf.get_i16_le(),
        timestamp: decode_timestamp(buf.get_u64_le()),
        payload_len: buf.get_i32_le(),
    }
}

pub fn encode_count(count: u64) -> [u8; 8] {
    (count as i64).to_le_bytes()
}

pub fn encode_duration(duration: Duration) -> [u8; 8] {
    duration_to_ticks(duration).to_le_bytes()
}

/// 100-ns ticks since 0001-01-01 for a UTC instant
pub fn to_ticks(timestamp: DateTime<Utc>) -> Result<i64> {
    let secs = timestamp.timestamp();
    let sub = (timestamp.timestamp_subsec_nanos() as i64 % 1_000_000_000) / NANOS_PER_TICK;

    secs.checked_mul(TICKS_PER_SECOND)
        .and_then(|ticks| ticks.checked_add(UNIX_EPOCH_TICKS + sub))
        .filter(|ticks| (0..=MAX_TICKS).contains(ticks))
        .ok_or_else(|| {
            ContinuumError::Format(format!(
                "Timestamp {} is outside the representable range",
                timestamp
            ))
        })
}

pub fn from_ticks(ticks: i64) -> DateTime<Utc> {
    let unix_ticks = ticks - UNIX_EPOCH_TICKS;
    let secs = unix_ticks.div_euclid(TICKS_PER_SECOND);
    let nanos = (unix_ticks.rem_euclid(TICKS_PER_SECOND) * NANOS_PER_TICK) as u32;
    DateTime::<Utc>::from_timestamp(secs, nanos).unwrap_or_default()
}

/// Drop precision finer than one tick
pub fn truncate_to_tick(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    let nanos = timestamp.nanosecond();
    timestamp
        .with_nanosecond(nanos - nanos % NANOS_PER_TICK as u32)
        .unwrap_or(timestamp)
}

pub fn encode_timestamp(timestamp: DateTime<Utc>) -> Result<u64> {
    Ok(to_ticks(timestamp)? as u64 | KIND_UTC)
}

pub fn decode_timestamp(raw: u64) -> DateTime<Utc> {
    from_ticks((raw & !KIND_MASK) as i64)
}

pub fn duration_to_ticks(duration: Duration) -> i64 {
    duration
        .num_nanoseconds()
        .map(|n| n / NANOS_PER_TICK)
        .unwrap_or_else(|| {
            duration
                .num_microseconds()
                .unwrap_or(i64::MAX)
                .saturating_mul(10)
        })
}

pub fn ticks_to_duration(ticks: i64) -> Duration {
    Duration::microseconds(ticks / 10) + Duration::nanoseconds((ticks % 10) * NANOS_PER_TICK)
}

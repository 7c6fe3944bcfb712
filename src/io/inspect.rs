// src/io/inspect.rs
//! Codec-independent container summary
//!
//! Walks the header, type table and frame headers without materializing any
//! payload, so a capture can be examined even when none of its codecs are
//! available.

use crate::io::channel::ByteChannel;
use crate::io::format::{self, FRAME_HEADER_LEN, HEADER_LEN, TABLE_ENTRY_LEN};
use crate::utils::errors::{ContinuumError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct ContainerSummary {
    pub version: format::Version,
    pub created: DateTime<Utc>,

    /// Count recorded in the header
    pub count: u64,

    /// Duration recorded in the header, in milliseconds
    pub duration_ms: i64,

    pub types: Vec<TypeEntry>,

    /// Populated only when frames were requested
    pub frames: Vec<FrameSummary>,

    /// Bytes after the last complete frame
    pub trailing_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TypeEntry {
    pub code: i16,
    pub type_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct FrameSummary {
    pub index: u64,

    /// Absolute byte offset of the frame
    pub offset: u64,

    pub code: i16,
    pub type_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub payload_len: u32,
}

/// Summarize the container starting at byte 0 of `channel`.
///
/// Frame scanning stops at the first incomplete or inconsistent frame; the
/// remaining bytes are reported as `trailing_bytes`.
pub fn inspect(channel: &ByteChannel, with_frames: bool) -> Result<ContainerSummary> {
    let bytes = channel.snapshot()?;
    let (header, table_len) = format::decode_header(&bytes)?;

    let table_end = HEADER_LEN + table_len * TABLE_ENTRY_LEN;
    if bytes.len() < table_end {
        return Err(ContinuumError::Format(format!(
            "Type table declares {} entries but the container ends at byte {}",
            table_len,
            bytes.len()
        )));
    }

    let types: Vec<TypeEntry> = bytes[HEADER_LEN..table_end]
        .chunks_exact(TABLE_ENTRY_LEN)
        .map(|chunk| {
            let mut entry = [0u8; TABLE_ENTRY_LEN];
            entry.copy_from_slice(chunk);
            let (code, type_id) = format::decode_table_entry(&entry);
            TypeEntry { code, type_id }
        })
        .collect();

    let mut frames = Vec::new();
    let mut cursor = table_end;
    let mut index = 0u64;

    while bytes.len() - cursor >= FRAME_HEADER_LEN {
        let mut fixed = [0u8; FRAME_HEADER_LEN];
        fixed.copy_from_slice(&bytes[cursor..cursor + FRAME_HEADER_LEN]);
        let frame = format::decode_frame_header(&fixed);

        if frame.payload_len < 0 {
            break;
        }
        let frame_end = cursor + FRAME_HEADER_LEN + frame.payload_len as usize;
        if frame_end > bytes.len() {
            break;
        }

        if with_frames {
            frames.push(FrameSummary {
                index,
                offset: cursor as u64,
                code: frame.code,
                type_id: types
                    .iter()
                    .find(|entry| entry.code == frame.code)
                    .map(|entry| entry.type_id),
                timestamp: frame.timestamp,
                payload_len: frame.payload_len as u32,
            });
        }

        index += 1;
        cursor = frame_end;
    }

    debug!("Inspected {} frames, {} trailing bytes", index, bytes.len() - cursor);

    Ok(ContainerSummary {
        version: header.version,
        created: header.created,
        count: header.count,
        duration_ms: header.duration.num_milliseconds(),
        types,
        frames,
        trailing_bytes: (bytes.len() - cursor) as u64,
    })
}

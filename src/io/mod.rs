// src/io/mod.rs
//! Capture container I/O
//!
//! - **Channel**: thread-safe seekable byte sink/source
//! - **Format**: byte-exact header, type table and frame codec
//! - **Writer**: appends frames and keeps the header counters current
//! - **Reader**: sequential decode, seek by replay, non-destructive peek
//! - **Stream**: reader + writer over one channel with independent cursors
//! - **Inspect**: codec-free container summary
//!
//! # Architecture
//!
//! ```text
//! producer ── write() ──┐                         ┌── read()/peek() ── consumer
//!                       ▼                         │
//!               CaptureStream (cursor lock)  ─────┘
//!                 │                    │
//!           CaptureWriter        CaptureReader
//!                 │                    │
//!                 └──── ByteChannel ───┘
//!                     (per-op lock)
//! ```

pub mod channel;
pub mod format;
pub mod inspect;
pub mod reader;
pub mod stream;
pub mod writer;

// Re-export commonly used types
pub use channel::ByteChannel;
pub use format::{CaptureHeader, Version};
pub use inspect::{inspect, ContainerSummary};
pub use reader::CaptureReader;
pub use stream::{AccessMode, CaptureStream};
pub use writer::CaptureWriter;

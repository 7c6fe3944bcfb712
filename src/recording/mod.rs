// src/recording/mod.rs
//! Live recording into a capture container
//!
//! - **RecordBuffer**: FIFO of decoded records with counters
//! - **StateRecorder**: a source of records for one type identity
//! - **CaptureService**: merges recorder buffers into one container
//!
//! # Architecture
//!
//! ```text
//! Recorder A ─► RecordBuffer ─┐
//! Recorder B ─► RecordBuffer ─┼─ flush() ─► − skew ─► sort by time ─► CaptureStream
//! Recorder C ─► RecordBuffer ─┘
//! ```

pub mod buffer;
pub mod capture_service;
pub mod recorder;

// Re-export commonly used types
pub use buffer::{BufferStats, RecordBuffer};
pub use capture_service::CaptureService;
pub use recorder::{BufferedRecorder, StateRecorder};

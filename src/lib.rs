// src/lib.rs
//! Continuum: time-indexed capture and playback of typed binary records
//!
//! Records from any number of sources are appended to a compact binary
//! container with their timestamps, then replayed later at their original
//! offsets under adjustable speed and pause.
//!
//! # Architecture
//!
//! The library is structured into several key modules:
//!
//! - **codec**: type codecs, decoded records, the type registry
//! - **io**: byte channel, container format, reader, writer, capture stream
//! - **tasks**: playback tasks and the real-time scheduler
//! - **recording**: record buffers, recorders, live capture service
//! - **playback**: stream playback with filters and codec notifications
//! - **observability**: tracing setup and metric names
//! - **utils**: errors and configuration

// Public module exports
pub mod codec;
pub mod io;
pub mod observability;
pub mod playback;
pub mod recording;
pub mod tasks;
pub mod utils;

// Re-export commonly used types
pub use codec::{DecodedRecord, PlaceholderCodec, TypeCodec, TypeRegistry};
pub use io::{AccessMode, ByteChannel, CaptureReader, CaptureStream, CaptureWriter};
pub use playback::{PlaybackEvent, PlaybackService, PredicateFilter, RecordFilter};
pub use recording::{BufferedRecorder, CaptureService, RecordBuffer, StateRecorder};
pub use tasks::{RecordTask, RecordTaskFactory, Scheduler, Task, TaskFactory};
pub use utils::config::ContinuumConfig;
pub use utils::errors::{ContinuumError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

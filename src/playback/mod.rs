// src/playback/mod.rs
//! Playback of one or more capture streams through the scheduler
//!
//! - **RecordFilter**: drops records before scheduling
//! - **PlaybackService**: reads streams, filters, schedules, controls the clock
//! - **PlaybackEvent**: notifications such as a missing codec

pub mod filter;
pub mod service;

// Re-export commonly used types
pub use filter::{PredicateFilter, RecordFilter};
pub use service::{PlaybackEvent, PlaybackService};

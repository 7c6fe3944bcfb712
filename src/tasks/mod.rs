// src/tasks/mod.rs
//! Timed playback of decoded records
//!
//! - **Task**: a record plus the offset at which it should run
//! - **TaskFactory**: builds tasks from records
//! - **Scheduler**: single-thread real-time executor with pause and speed

pub mod scheduler;
pub mod task;

// Re-export commonly used types
pub use scheduler::Scheduler;
pub use task::{RecordTask, RecordTaskFactory, Task, TaskFactory};

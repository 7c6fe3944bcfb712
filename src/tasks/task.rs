// src/tasks/task.rs
//! Playback tasks
//!
//! A task pairs a decoded record with the offset at which it should run.
//! Factories let a playback service build tasks without knowing how they
//! execute.

use crate::codec::{DecodedRecord, TypeRegistry};
use crate::utils::errors::{ContinuumError, Result};
use chrono::Duration;
use std::sync::Arc;

/// Unit of work consumed exactly once by the scheduler
pub trait Task: Send {
    /// Offset from scheduler start at which the task is due
    fn desired_execution(&self) -> Duration;

    fn execute(&self) -> Result<()>;
}

/// Builds tasks from decoded records
pub trait TaskFactory: Send + Sync {
    fn create(&self, record: DecodedRecord) -> Box<dyn Task>;
}

/// Runs a record through its codec's `execute`
pub struct RecordTask {
    registry: Arc<TypeRegistry>,
    record: DecodedRecord,
}

impl RecordTask {
    pub fn new(registry: Arc<TypeRegistry>, record: DecodedRecord) -> Self {
        Self { registry, record }
    }

    pub fn record(&self) -> &DecodedRecord {
        &self.record
    }
}

impl Task for RecordTask {
    fn desired_execution(&self) -> Duration {
        self.record.offset
    }

    fn execute(&self) -> Result<()> {
        // Resolved at execution time; the codec may arrive after scheduling
        let codec = self
            .registry
            .find(&self.record.type_id)
            .ok_or(ContinuumError::UnregisteredCodec(self.record.type_id))?;

        codec.execute(&self.record)
    }
}

impl std::fmt::Debug for RecordTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordTask")
            .field("type_id", &self.record.type_id)
            .field("offset", &self.record.offset)
            .finish()
    }
}

/// Default factory producing [`RecordTask`]s
#[derive(Debug, Clone)]
pub struct RecordTaskFactory {
    registry: Arc<TypeRegistry>,
}

impl RecordTaskFactory {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }
}

impl TaskFactory for RecordTaskFactory {
    fn create(&self, record: DecodedRecord) -> Box<dyn Task> {
        Box::new(RecordTask::new(Arc::clone(&self.registry), record))
    }
}

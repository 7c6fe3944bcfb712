// src/playback/service.rs
//! Playback service
//!
//! Collects capture streams and filters, turns every remaining record into a
//! task on `start`, and hands them to a scheduler. Streams that reference a
//! type without a registered codec raise [`PlaybackEvent::CodecRequired`] so
//! the caller can install one before starting.

use crate::codec::TypeRegistry;
use crate::io::stream::CaptureStream;
use crate::observability::RECORDS_FILTERED;
use crate::playback::filter::RecordFilter;
use crate::tasks::{RecordTaskFactory, Scheduler, TaskFactory};
use crate::utils::config::SchedulerConfig;
use crate::utils::errors::{ContinuumError, Result};
use chrono::Duration;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Notifications raised by the playback service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// A stream references a type identity with no codec in the registry
    CodecRequired(Uuid),
}

pub struct PlaybackService {
    registry: Arc<TypeRegistry>,
    scheduler: Scheduler,
    factory: Arc<dyn TaskFactory>,
    streams: Mutex<Vec<Arc<CaptureStream>>>,
    filters: Mutex<Vec<Arc<dyn RecordFilter>>>,
    events_tx: Sender<PlaybackEvent>,
    events_rx: Receiver<PlaybackEvent>,
}

impl PlaybackService {
    /// Service with its own scheduler and a [`RecordTaskFactory`]
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self::with_config(registry, SchedulerConfig::default())
    }

    pub fn with_config(registry: Arc<TypeRegistry>, config: SchedulerConfig) -> Self {
        let factory = Arc::new(RecordTaskFactory::new(Arc::clone(&registry)));
        Self::with_parts(registry, Scheduler::with_config(config), factory)
    }

    pub fn with_parts(
        registry: Arc<TypeRegistry>,
        scheduler: Scheduler,
        factory: Arc<dyn TaskFactory>,
    ) -> Self {
        let (events_tx, events_rx) = unbounded();

        Self {
            registry,
            scheduler,
            factory,
            streams: Mutex::new(Vec::new()),
            filters: Mutex::new(Vec::new()),
            events_tx,
            events_rx,
        }
    }

    /// Add a readable stream for playback
    pub fn add_stream(&self, stream: Arc<CaptureStream>) -> Result<()> {
        if !stream.can_read() {
            return Err(ContinuumError::StreamAccess(
                "Cannot read from stream".to_string(),
            ));
        }

        for type_id in stream.codecs() {
            if self.registry.find(&type_id).is_none() {
                warn!("No codec registered for type {}", type_id);
                // A dropped receiver only means nobody is listening
                let _ = self.events_tx.send(PlaybackEvent::CodecRequired(type_id));
            }
        }

        self.streams.lock().push(stream);
        debug!("Stream added for playback");
        Ok(())
    }

    pub fn add_filter(&self, filter: Arc<dyn RecordFilter>) {
        self.filters.lock().push(filter);
    }

    /// Remove a previously added filter. Returns whether it was present.
    pub fn remove_filter(&self, filter: &Arc<dyn RecordFilter>) -> bool {
        let target = Arc::as_ptr(filter) as *const ();
        let mut filters = self.filters.lock();
        let before = filters.len();
        filters.retain(|f| Arc::as_ptr(f) as *const () != target);
        before != filters.len()
    }

    /// Schedule every remaining record of every stream and start the clock.
    ///
    /// Records that fail to decode are logged and skipped. Returns the number
    /// of tasks scheduled.
    pub fn start(&self) -> Result<usize> {
        let streams = self.streams.lock().clone();
        let filters = self.filters.lock().clone();

        let mut scheduled = 0;
        let mut filtered = 0;

        for stream in &streams {
            let count = stream.count()?;
            for _ in stream.position()..count {
                let record = match stream.read() {
                    Ok(record) => record,
                    Err(e) => {
                        warn!("Skipping unreadable record: {}", e);
                        continue;
                    }
                };

                if filters.iter().any(|f| f.filter(&record)) {
                    metrics::counter!(RECORDS_FILTERED).increment(1);
                    filtered += 1;
                    continue;
                }

                self.scheduler.add(self.factory.create(record));
                scheduled += 1;
            }
        }

        self.scheduler.start()?;
        info!(
            "Playback started: {} tasks from {} streams, {} filtered",
            scheduled,
            streams.len(),
            filtered
        );
        Ok(scheduled)
    }

    pub fn stop(&self) {
        self.scheduler.stop();
    }

    pub fn pause(&self) {
        self.scheduler.set_paused(true);
    }

    pub fn resume(&self) {
        self.scheduler.set_paused(false);
    }

    pub fn is_paused(&self) -> bool {
        self.scheduler.is_paused()
    }

    pub fn set_speed(&self, speed: f64) {
        self.scheduler.set_speed(speed);
    }

    pub fn speed(&self) -> f64 {
        self.scheduler.speed()
    }

    /// Playback length at normal speed: the longest stream duration
    pub fn duration(&self) -> Result<Duration> {
        let streams = self.streams.lock();
        let mut longest = Duration::zero();
        for stream in streams.iter() {
            longest = longest.max(stream.duration()?);
        }
        Ok(longest)
    }

    /// Receiver for playback notifications
    pub fn events(&self) -> Receiver<PlaybackEvent> {
        self.events_rx.clone()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn stream_count(&self) -> usize {
        self.streams.lock().len()
    }
}

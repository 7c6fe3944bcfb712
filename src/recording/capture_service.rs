// src/recording/capture_service.rs
//! Live capture service
//!
//! Merges the buffers of any number of recorders into one capture container.
//! Each flush drains every buffer, corrects timestamps by the start-up skew
//! measured across recorders, sorts the batch and appends it in time order.

use crate::codec::{DecodedRecord, PlaceholderCodec, TypeRegistry};
use crate::io::channel::ByteChannel;
use crate::io::format;
use crate::io::stream::{AccessMode, CaptureStream};
use crate::recording::recorder::StateRecorder;
use crate::utils::errors::{ContinuumError, Result};
use chrono::Duration;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Default)]
struct ServiceInner {
    recorders: Vec<Arc<dyn StateRecorder>>,

    /// Identities this service registered stand-in codecs for
    placeholders: Vec<Uuid>,

    stream: Option<CaptureStream>,
    skew: Duration,
    started: bool,
}

pub struct CaptureService {
    channel: Arc<ByteChannel>,
    registry: Arc<TypeRegistry>,
    inner: Mutex<ServiceInner>,
}

impl CaptureService {
    pub fn new(channel: Arc<ByteChannel>, registry: Arc<TypeRegistry>) -> Self {
        Self {
            channel,
            registry,
            inner: Mutex::new(ServiceInner::default()),
        }
    }

    /// Add a recorder; it is started at once if the service is running
    pub fn add(&self, recorder: Arc<dyn StateRecorder>) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.started {
            recorder.start()?;
        }

        debug!("Recorder {} added", recorder.type_id());
        inner.recorders.push(recorder);
        Ok(())
    }

    /// Remove every recorder of `type_id`. Returns whether any was present.
    pub fn remove(&self, type_id: &Uuid) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.recorders.len();
        inner.recorders.retain(|r| r.type_id() != *type_id);
        before != inner.recorders.len()
    }

    /// Open the capture container and start every recorder
    pub fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.started {
            debug!("Capture service already started");
            return Ok(());
        }

        // Every recorder identity needs a code before the type table is written
        let ids: Vec<Uuid> = inner.recorders.iter().map(|r| r.type_id()).collect();
        for id in ids {
            if self.registry.find(&id).is_none() {
                self.registry.add(Arc::new(PlaceholderCodec::new(id)))?;
                inner.placeholders.push(id);
                debug!("Placeholder codec registered for {}", id);
            }
        }

        let stream = CaptureStream::open(
            Arc::clone(&self.channel),
            AccessMode::Write,
            Arc::clone(&self.registry),
        )?;
        inner.stream = Some(stream);

        let mut skew = std::time::Duration::ZERO;
        for recorder in &inner.recorders {
            let begin = Instant::now();
            recorder.start()?;
            skew = skew.max(begin.elapsed());
        }
        inner.skew = Duration::from_std(skew).unwrap_or_else(|_| Duration::zero());
        inner.started = true;

        info!(
            "Capture service started with {} recorders (skew {}µs)",
            inner.recorders.len(),
            inner.skew.num_microseconds().unwrap_or(i64::MAX)
        );
        Ok(())
    }

    /// Drain every recorder buffer into the container. Returns the number of
    /// records written.
    pub fn flush(&self) -> Result<usize> {
        let mut inner = self.inner.lock();
        Self::flush_locked(&mut inner)
    }

    fn flush_locked(inner: &mut ServiceInner) -> Result<usize> {
        let stream = inner.stream.as_ref().ok_or_else(|| {
            ContinuumError::StreamAccess("Capture service has no open stream".to_string())
        })?;

        let mut batch: Vec<DecodedRecord> = Vec::new();
        for recorder in &inner.recorders {
            while let Some(mut record) = recorder.buffer().try_dequeue() {
                if let Some(adjusted) = record.timestamp.checked_sub_signed(inner.skew) {
                    if matches!(format::to_ticks(adjusted), Ok(ticks) if ticks > 0) {
                        record.timestamp = adjusted;
                    }
                }
                batch.push(record);
            }
        }

        if batch.is_empty() {
            return Ok(0);
        }

        // Stable: records with equal timestamps keep recorder order
        batch.sort_by_key(|record| record.timestamp);

        let mut written = 0;
        for record in &batch {
            match stream.write(record) {
                Ok(()) => written += 1,
                Err(ContinuumError::UnregisteredCodec(id)) => {
                    warn!("Dropping record of unregistered type {}", id);
                }
                Err(e) => return Err(e),
            }
        }
        stream.flush()?;

        debug!("Flushed {} of {} buffered records", written, batch.len());
        Ok(written)
    }

    /// Stop every recorder, flush what they buffered and detach them
    pub fn stop(&self) -> Result<()> {
        let mut inner = self.inner.lock();

        for recorder in &inner.recorders {
            recorder.stop();
        }

        let flushed = if inner.stream.is_some() {
            Self::flush_locked(&mut inner)
        } else {
            Ok(0)
        };

        inner.recorders.clear();
        for id in inner.placeholders.drain(..) {
            self.registry.remove(&id);
        }
        inner.started = false;

        let flushed = flushed?;
        info!("Capture service stopped, {} records flushed", flushed);
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.inner.lock().started
    }

    /// Largest recorder start-up delay measured by the last `start`
    pub fn skew(&self) -> Duration {
        self.inner.lock().skew
    }

    pub fn recorder_count(&self) -> usize {
        self.inner.lock().recorders.len()
    }

    /// Records written since the last `start`
    pub fn count(&self) -> Result<u64> {
        match &self.inner.lock().stream {
            Some(stream) => stream.count(),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::testing::RecordingCodec;
    use crate::codec::TypeCodec;
    use crate::io::inspect::inspect;
    use crate::recording::buffer::RecordBuffer;
    use crate::recording::recorder::BufferedRecorder;
    use chrono::{DateTime, Utc};

    /// Recorder whose start takes a while
    struct SlowRecorder {
        inner: BufferedRecorder,
        delay: std::time::Duration,
    }

    impl StateRecorder for SlowRecorder {
        fn type_id(&self) -> Uuid {
            self.inner.type_id()
        }

        fn buffer(&self) -> &RecordBuffer {
            self.inner.buffer()
        }

        fn start(&self) -> Result<()> {
            std::thread::sleep(self.delay);
            self.inner.start()
        }

        fn stop(&self) {
            self.inner.stop()
        }

        fn is_started(&self) -> bool {
            self.inner.is_started()
        }
    }

    fn service() -> (Arc<ByteChannel>, Arc<TypeRegistry>, CaptureService) {
        let channel = Arc::new(ByteChannel::in_memory());
        let registry = Arc::new(TypeRegistry::new());
        let service = CaptureService::new(Arc::clone(&channel), Arc::clone(&registry));
        (channel, registry, service)
    }

    #[test]
    fn test_flush_before_start_fails() {
        let (_, _, service) = service();
        assert!(matches!(
            service.flush(),
            Err(ContinuumError::StreamAccess(_))
        ));
    }

    #[test]
    fn test_merges_recorders_in_time_order() {
        let (channel, registry, service) = service();
        let codec = Arc::new(RecordingCodec::random());
        registry.add(codec.clone()).unwrap();

        let first = Arc::new(BufferedRecorder::new(codec.type_id()));
        let second = Arc::new(BufferedRecorder::new(Uuid::new_v4()));
        service.add(first.clone()).unwrap();
        service.add(second.clone()).unwrap();
        service.start().unwrap();

        let base: DateTime<Utc> = Utc::now();
        first.record_at(vec![1u8], base + Duration::milliseconds(30));
        second.record_at(vec![2u8], base + Duration::milliseconds(10));
        first.record_at(vec![3u8], base + Duration::milliseconds(50));
        second.record_at(vec![4u8], base + Duration::milliseconds(20));

        assert_eq!(service.flush().unwrap(), 4);
        assert_eq!(service.count().unwrap(), 4);

        let summary = inspect(&channel, true).unwrap();
        assert_eq!(summary.count, 4);
        assert_eq!(summary.types.len(), 2);
        assert!(summary
            .frames
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));

        let ids: Vec<Option<Uuid>> = summary.frames.iter().map(|f| f.type_id).collect();
        assert_eq!(
            ids,
            vec![
                Some(second.type_id()),
                Some(second.type_id()),
                Some(first.type_id()),
                Some(first.type_id())
            ]
        );
    }

    #[test]
    fn test_placeholders_registered_and_removed() {
        let (_, registry, service) = service();
        let known = Arc::new(RecordingCodec::random());
        registry.add(known.clone()).unwrap();

        let unknown = Uuid::new_v4();
        service
            .add(Arc::new(BufferedRecorder::new(known.type_id())))
            .unwrap();
        service.add(Arc::new(BufferedRecorder::new(unknown))).unwrap();

        service.start().unwrap();
        assert!(registry.is_allocated(&unknown));
        assert_eq!(registry.len(), 2);

        service.stop().unwrap();
        assert!(!registry.is_allocated(&unknown));
        assert!(registry.is_allocated(&known.type_id()));
        assert_eq!(service.recorder_count(), 0);
        assert!(!service.is_started());
    }

    #[test]
    fn test_add_while_started_starts_recorder() {
        let (_, registry, service) = service();
        let codec = Arc::new(RecordingCodec::random());
        registry.add(codec.clone()).unwrap();
        service.start().unwrap();

        let late = Arc::new(BufferedRecorder::new(codec.type_id()));
        service.add(late.clone()).unwrap();
        assert!(late.is_started());

        assert!(late.record(vec![5u8]));
        assert_eq!(service.flush().unwrap(), 1);

        assert!(service.remove(&codec.type_id()));
        assert!(!service.remove(&codec.type_id()));
    }

    #[test]
    fn test_stop_flushes_pending_records() {
        let (channel, registry, service) = service();
        let codec = Arc::new(RecordingCodec::random());
        registry.add(codec.clone()).unwrap();

        let recorder = Arc::new(BufferedRecorder::new(codec.type_id()));
        service.add(recorder.clone()).unwrap();
        service.start().unwrap();

        recorder.record(vec![1u8, 2, 3]);
        recorder.record(vec![4u8]);
        service.stop().unwrap();

        assert!(!recorder.is_started());
        assert_eq!(inspect(&channel, false).unwrap().count, 2);
    }

    #[test]
    fn test_skew_subtracted() {
        let (channel, registry, service) = service();
        let codec = Arc::new(RecordingCodec::random());
        registry.add(codec.clone()).unwrap();

        let slow = Arc::new(SlowRecorder {
            inner: BufferedRecorder::new(codec.type_id()),
            delay: std::time::Duration::from_millis(20),
        });
        service.add(slow.clone()).unwrap();
        service.start().unwrap();

        let skew = service.skew();
        assert!(skew >= Duration::milliseconds(20));

        let stamped = Utc::now() + Duration::seconds(1);
        slow.inner.record_at(vec![0u8], stamped);
        service.flush().unwrap();

        let summary = inspect(&channel, true).unwrap();
        assert_eq!(
            summary.frames[0].timestamp,
            format::truncate_to_tick(stamped - skew)
        );
    }
}

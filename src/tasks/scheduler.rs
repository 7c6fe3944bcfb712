// src/tasks/scheduler.rs
//! Real-time playback scheduler
//!
//! Tasks are kept in a map ordered by desired execution offset and run on one
//! dedicated thread when the scheduler clock reaches their offset. The clock
//! is wall time since `start`, minus time spent paused, scaled by the speed.
//!
//! # Architecture
//!
//! ```text
//! add() ──► [ BTreeMap<offset, Slot> ] ──(notify)──► execution thread
//!                                                     │
//!              now = (wall − start − paused) × speed  │
//!                                                     ▼
//!                                   due? pop + execute : wait_for(next − lead)
//! ```

use crate::observability::{TASKS_EXECUTED, TASK_FAILURES};
use crate::tasks::task::Task;
use crate::utils::config::SchedulerConfig;
use crate::utils::errors::Result;
use chrono::Duration;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration as StdDuration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Queue entry
enum Slot {
    Task(Box<dyn Task>),

    /// Unblocks and terminates the execution loop
    Halt,
}

struct SchedulerState {
    queue: BTreeMap<Duration, Slot>,
    running: bool,

    /// Bumped on every start so a loop from a previous run exits
    generation: u64,

    started: Option<Instant>,
    paused_at: Option<Instant>,
    paused_total: StdDuration,
    speed: f64,
}

impl SchedulerState {
    fn now(&self) -> Duration {
        let Some(started) = self.started else {
            return Duration::zero();
        };

        let until = self.paused_at.unwrap_or_else(Instant::now);
        let elapsed = until
            .saturating_duration_since(started)
            .saturating_sub(self.paused_total);

        StdDuration::try_from_secs_f64(elapsed.as_secs_f64() * self.speed)
            .ok()
            .and_then(|scaled| Duration::from_std(scaled).ok())
            .unwrap_or(Duration::MAX)
    }

    fn task_count(&self) -> usize {
        self.queue
            .values()
            .filter(|slot| matches!(slot, Slot::Task(_)))
            .count()
    }
}

struct Shared {
    state: Mutex<SchedulerState>,
    wake: Condvar,
    config: SchedulerConfig,
}

/// Executes tasks in offset order against a pausable, speed-scaled clock
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        let speed = normalize_speed(config.speed);

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SchedulerState {
                    queue: BTreeMap::new(),
                    running: false,
                    generation: 0,
                    started: None,
                    paused_at: None,
                    paused_total: StdDuration::ZERO,
                    speed,
                }),
                wake: Condvar::new(),
                config,
            }),
        }
    }

    /// Queue a task. Returns the offset it was queued under, which differs
    /// from the desired one when that key was already taken.
    pub fn add(&self, task: Box<dyn Task>) -> Duration {
        let mut key = task.desired_execution();
        let unit = Duration::milliseconds(1);

        let mut state = self.shared.state.lock();
        while state.queue.contains_key(&key) {
            key = key + unit;
        }
        state.queue.insert(key, Slot::Task(task));
        drop(state);

        trace!("Task queued at {}ms", key.num_milliseconds());
        self.shared.wake.notify_one();
        key
    }

    /// Launch the execution thread. A no-op when already running.
    pub fn start(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.running {
            debug!("Scheduler already running");
            return Ok(());
        }

        let now = Instant::now();
        state.queue.retain(|_, slot| matches!(slot, Slot::Task(_)));
        state.generation += 1;
        state.running = true;
        state.started = Some(now);
        state.paused_total = StdDuration::ZERO;
        if state.paused_at.is_some() {
            state.paused_at = Some(now);
        }

        let generation = state.generation;
        let pending = state.task_count();
        drop(state);

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("continuum-scheduler".to_string())
            .spawn(move || run_loop(shared, generation));

        if let Err(e) = spawned {
            self.shared.state.lock().running = false;
            return Err(e.into());
        }

        info!("Scheduler started with {} pending tasks", pending);
        Ok(())
    }

    /// Drop every queued task and tell the loop to exit.
    ///
    /// Returns without waiting for the loop or an in-flight task.
    pub fn stop(&self) {
        let mut state = self.shared.state.lock();
        let dropped = state.task_count();

        state.queue.clear();
        state.queue.insert(Duration::MIN, Slot::Halt);
        state.running = false;
        drop(state);

        self.shared.wake.notify_all();
        info!("Scheduler stopped, {} tasks discarded", dropped);
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.lock().running
    }

    /// Wall-clock instant of the last `start`
    pub fn started_at(&self) -> Option<Instant> {
        self.shared.state.lock().started
    }

    /// Current position of the scheduler clock
    pub fn now(&self) -> Duration {
        self.shared.state.lock().now()
    }

    pub fn speed(&self) -> f64 {
        self.shared.state.lock().speed
    }

    /// Set the clock multiplier. Zero, negative and non-finite values fall
    /// back to 1.
    pub fn set_speed(&self, speed: f64) {
        let speed = normalize_speed(speed);
        self.shared.state.lock().speed = speed;
        self.shared.wake.notify_all();
        debug!("Scheduler speed set to {}", speed);
    }

    pub fn is_paused(&self) -> bool {
        self.shared.state.lock().paused_at.is_some()
    }

    /// Toggle pause and return the new paused state
    pub fn pause(&self) -> bool {
        let paused = !self.is_paused();
        self.set_paused(paused);
        paused
    }

    pub fn set_paused(&self, paused: bool) {
        let mut state = self.shared.state.lock();
        match (paused, state.paused_at) {
            (true, None) => {
                state.paused_at = Some(Instant::now());
                debug!("Scheduler paused at {}ms", state.now().num_milliseconds());
            }
            (false, Some(since)) => {
                state.paused_total += since.elapsed();
                state.paused_at = None;
                debug!("Scheduler resumed at {}ms", state.now().num_milliseconds());
            }
            _ => return,
        }
        drop(state);
        self.shared.wake.notify_all();
    }

    /// Number of queued tasks
    pub fn len(&self) -> usize {
        self.shared.state.lock().task_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}

fn normalize_speed(speed: f64) -> f64 {
    if speed.is_finite() && speed > 0.0 {
        speed
    } else {
        warn!("Rejected playback speed {}, using 1", speed);
        1.0
    }
}

fn run_loop(shared: Arc<Shared>, generation: u64) {
    debug!("Scheduler loop {} entered", generation);
    let config = &shared.config;
    let mut state = shared.state.lock();

    loop {
        if state.generation != generation || !state.running {
            break;
        }

        let Some((&due, slot)) = state.queue.first_key_value() else {
            shared.wake.wait(&mut state);
            continue;
        };

        if matches!(slot, Slot::Halt) {
            state.queue.remove(&due);
            break;
        }

        if state.paused_at.is_some() {
            shared.wake.wait_for(&mut state, config.idle_poll());
            continue;
        }

        let now = state.now();
        if now >= due {
            if let Some(Slot::Task(task)) = state.queue.remove(&due) {
                MutexGuard::unlocked(&mut state, || execute(task.as_ref(), due));
            }
            continue;
        }

        let ahead = (due - now).to_std().unwrap_or_default();
        let wall = StdDuration::try_from_secs_f64(ahead.as_secs_f64() / state.speed)
            .unwrap_or(StdDuration::MAX);

        let wait = if wall > config.sleep_threshold() {
            wall - config.wake_lead()
        } else {
            wall
        };
        shared.wake.wait_for(&mut state, wait);
    }

    debug!("Scheduler loop {} exited", generation);
}

fn execute(task: &dyn Task, due: Duration) {
    match panic::catch_unwind(AssertUnwindSafe(|| task.execute())) {
        Ok(Ok(())) => {
            metrics::counter!(TASKS_EXECUTED).increment(1);
            trace!("Task at {}ms executed", due.num_milliseconds());
        }
        Ok(Err(e)) => {
            metrics::counter!(TASK_FAILURES).increment(1);
            error!("Task at {}ms failed: {}", due.num_milliseconds(), e);
        }
        Err(_) => {
            metrics::counter!(TASK_FAILURES).increment(1);
            error!("Task at {}ms panicked", due.num_milliseconds());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::errors::ContinuumError;
    use crossbeam_channel::{unbounded, Receiver, Sender};

    struct SignalTask {
        desired: Duration,
        label: u32,
        sink: Sender<(u32, Instant)>,
    }

    impl Task for SignalTask {
        fn desired_execution(&self) -> Duration {
            self.desired
        }

        fn execute(&self) -> Result<()> {
            let _ = self.sink.send((self.label, Instant::now()));
            Ok(())
        }
    }

    struct FailingTask {
        desired: Duration,
        panic: bool,
    }

    impl Task for FailingTask {
        fn desired_execution(&self) -> Duration {
            self.desired
        }

        fn execute(&self) -> Result<()> {
            if self.panic {
                panic!("task blew up");
            }
            Err(ContinuumError::Codec("refused".to_string()))
        }
    }

    fn signal(ms: i64, label: u32, sink: &Sender<(u32, Instant)>) -> Box<dyn Task> {
        Box::new(SignalTask {
            desired: Duration::milliseconds(ms),
            label,
            sink: sink.clone(),
        })
    }

    fn collect(rx: &Receiver<(u32, Instant)>, n: usize) -> Vec<(u32, Instant)> {
        (0..n)
            .map(|_| rx.recv_timeout(StdDuration::from_secs(2)).unwrap())
            .collect()
    }

    #[test]
    fn test_executes_in_offset_order() {
        let (tx, rx) = unbounded();
        let scheduler = Scheduler::new();

        scheduler.add(signal(40, 3, &tx));
        scheduler.add(signal(0, 1, &tx));
        scheduler.add(signal(20, 2, &tx));
        scheduler.start().unwrap();

        let labels: Vec<u32> = collect(&rx, 3).into_iter().map(|(l, _)| l).collect();
        assert_eq!(labels, vec![1, 2, 3]);
        scheduler.stop();
    }

    #[test]
    fn test_executes_near_offsets() {
        let (tx, rx) = unbounded();
        let scheduler = Scheduler::new();

        for (i, ms) in [0i64, 30, 60].iter().enumerate() {
            scheduler.add(signal(*ms, i as u32, &tx));
        }
        scheduler.start().unwrap();
        let started = scheduler.started_at().unwrap();

        let margin = StdDuration::from_millis(50);
        for (label, at) in collect(&rx, 3) {
            let target = started + StdDuration::from_millis(30 * label as u64);
            let drift = if at >= target { at - target } else { target - at };
            assert!(drift < margin, "task {} drifted {:?}", label, drift);
        }
        scheduler.stop();
    }

    #[test]
    fn test_colliding_offsets_bumped() {
        let (tx, _rx) = unbounded();
        let scheduler = Scheduler::new();

        let keys: Vec<Duration> = (0..3).map(|i| scheduler.add(signal(10, i, &tx))).collect();

        assert_eq!(
            keys,
            vec![
                Duration::milliseconds(10),
                Duration::milliseconds(11),
                Duration::milliseconds(12)
            ]
        );
        assert_eq!(scheduler.len(), 3);
    }

    #[test]
    fn test_invalid_speed_reset() {
        let scheduler = Scheduler::new();

        for bad in [0.0, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            scheduler.set_speed(2.5);
            scheduler.set_speed(bad);
            assert_eq!(scheduler.speed(), 1.0);
        }

        scheduler.set_speed(4.0);
        assert_eq!(scheduler.speed(), 4.0);
    }

    #[test]
    fn test_extreme_speeds_saturate() {
        let scheduler = Scheduler::new();
        scheduler.set_speed(1e300);
        scheduler.start().unwrap();
        thread::sleep(StdDuration::from_millis(2));

        assert_eq!(scheduler.now(), Duration::MAX);
        scheduler.stop();
    }

    #[test]
    fn test_tiny_speed_waits_until_changed() {
        let (tx, rx) = unbounded();
        let scheduler = Scheduler::new();
        scheduler.set_speed(1e-300);

        scheduler.add(signal(10, 0, &tx));
        scheduler.start().unwrap();
        assert!(rx.recv_timeout(StdDuration::from_millis(50)).is_err());

        scheduler.set_speed(1.0);
        assert_eq!(collect(&rx, 1)[0].0, 0);
        scheduler.stop();
    }

    #[test]
    fn test_speed_scales_clock() {
        let (tx, rx) = unbounded();
        let scheduler = Scheduler::new();
        scheduler.set_speed(4.0);

        scheduler.add(signal(200, 0, &tx));
        scheduler.start().unwrap();
        let started = scheduler.started_at().unwrap();

        let (_, at) = collect(&rx, 1)[0];
        assert!(at - started < StdDuration::from_millis(150));
        scheduler.stop();
    }

    #[test]
    fn test_pause_freezes_clock() {
        let (tx, rx) = unbounded();
        let scheduler = Scheduler::new();
        scheduler.start().unwrap();

        assert!(scheduler.pause());
        let frozen = scheduler.now();
        scheduler.add(signal(20, 0, &tx));

        thread::sleep(StdDuration::from_millis(80));
        assert!(rx.try_recv().is_err());
        assert_eq!(scheduler.now(), frozen);

        assert!(!scheduler.pause());
        assert!(rx.recv_timeout(StdDuration::from_secs(1)).is_ok());

        // Time spent paused is not counted
        assert!(scheduler.now() < Duration::milliseconds(70));
        scheduler.stop();
    }

    #[test]
    fn test_failures_do_not_halt_loop() {
        let (tx, rx) = unbounded();
        let scheduler = Scheduler::new();

        scheduler.add(Box::new(FailingTask {
            desired: Duration::zero(),
            panic: false,
        }));
        scheduler.add(Box::new(FailingTask {
            desired: Duration::milliseconds(5),
            panic: true,
        }));
        scheduler.add(signal(10, 7, &tx));
        scheduler.start().unwrap();

        assert_eq!(collect(&rx, 1)[0].0, 7);
        assert!(scheduler.is_running());
        scheduler.stop();
    }

    #[test]
    fn test_stop_clears_and_restart_runs() {
        let (tx, rx) = unbounded();
        let scheduler = Scheduler::new();

        scheduler.add(signal(10_000, 0, &tx));
        scheduler.start().unwrap();
        scheduler.stop();

        assert!(!scheduler.is_running());
        assert!(scheduler.is_empty());

        scheduler.add(signal(0, 1, &tx));
        scheduler.start().unwrap();
        assert_eq!(collect(&rx, 1)[0].0, 1);
        scheduler.stop();
    }
}

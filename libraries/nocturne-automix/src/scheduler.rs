//! Audio-clock job scheduler
//!
//! A single-producer, many-consumer tick source that fires one-shot
//! actions at chosen times on the audio output clock. Two job kinds:
//!
//! - armed jobs (`schedule`) fire as soon as their time enters the
//!   look-ahead horizon, for pre-roll arming of audio graph parameters
//! - deadline jobs (`run_at`) fire once their time has actually passed
//!
//! Jobs belong to named groups so an entire crossfade can be cancelled
//! in one call. Every job carries the session token live at creation;
//! a job whose token has been superseded is dropped silently at fire
//! time.

use crate::session::SessionToken;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Default look-ahead for armed jobs, in seconds
pub const DEFAULT_HORIZON: f64 = 1.5;

/// Cadence of the background ticker
pub const TICK_INTERVAL: Duration = Duration::from_millis(75);

/// Clock the scheduler fires against.
///
/// In production this is backed by the audio output clock so fire times
/// are sample-accurate; tests drive a manual clock.
pub trait AudioClock: Send + Sync {
    /// Monotonic time in seconds
    fn now(&self) -> f64;
}

/// Wall-clock fallback for platforms where the output clock is not
/// exposed
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioClock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Opaque job handle
pub type JobId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FireRule {
    /// Fire when `time <= now + horizon`
    Armed,
    /// Fire when `time <= now`
    Deadline,
}

struct Job {
    id: JobId,
    group: String,
    time: f64,
    rule: FireRule,
    token: u64,
    action: Box<dyn FnOnce() + Send>,
    cleanup: Option<Box<dyn FnOnce() + Send>>,
}

struct Inner {
    jobs: Vec<Job>,
    next_id: JobId,
}

/// The scheduler. Cheap to clone; clones share one job queue.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Mutex<Inner>>,
    clock: Arc<dyn AudioClock>,
    session: Arc<SessionToken>,
    horizon: f64,
}

impl Scheduler {
    pub fn new(clock: Arc<dyn AudioClock>, session: Arc<SessionToken>) -> Self {
        Self::with_horizon(clock, session, DEFAULT_HORIZON)
    }

    pub fn with_horizon(
        clock: Arc<dyn AudioClock>,
        session: Arc<SessionToken>,
        horizon: f64,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                jobs: Vec::new(),
                next_id: 1,
            })),
            clock,
            session,
            horizon,
        }
    }

    pub fn clock(&self) -> &Arc<dyn AudioClock> {
        &self.clock
    }

    /// Queue an armed job: fires once `time` enters the horizon.
    /// Used to pre-arm audio graph parameters ahead of their ramp.
    pub fn schedule(
        &self,
        group: &str,
        time: f64,
        action: impl FnOnce() + Send + 'static,
    ) -> JobId {
        self.push(group, time, FireRule::Armed, Box::new(action), None)
    }

    /// Queue a deadline job: fires once `time` has passed
    pub fn run_at(&self, group: &str, time: f64, action: impl FnOnce() + Send + 'static) -> JobId {
        self.push(group, time, FireRule::Deadline, Box::new(action), None)
    }

    /// Deadline job with a cleanup that runs if the job is cancelled or
    /// its group cleared before firing
    pub fn run_at_with_cleanup(
        &self,
        group: &str,
        time: f64,
        action: impl FnOnce() + Send + 'static,
        cleanup: impl FnOnce() + Send + 'static,
    ) -> JobId {
        self.push(
            group,
            time,
            FireRule::Deadline,
            Box::new(action),
            Some(Box::new(cleanup)),
        )
    }

    fn push(
        &self,
        group: &str,
        time: f64,
        rule: FireRule,
        action: Box<dyn FnOnce() + Send>,
        cleanup: Option<Box<dyn FnOnce() + Send>>,
    ) -> JobId {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.jobs.push(Job {
            id,
            group: group.to_string(),
            time,
            rule,
            token: self.session.current(),
            action,
            cleanup,
        });
        id
    }

    /// Cancel a single job. Its cleanup runs; a job that already fired
    /// is gone and this is a no-op.
    pub fn cancel(&self, id: JobId) {
        let job = {
            let mut inner = self.lock();
            inner
                .jobs
                .iter()
                .position(|j| j.id == id)
                .map(|i| inner.jobs.remove(i))
        };
        if let Some(job) = job {
            if let Some(cleanup) = job.cleanup {
                cleanup();
            }
        }
    }

    /// Cancel every job in a group, running cleanups. Idempotent; a
    /// cleared job never fires, even if it was already due on the tick
    /// performing the clear.
    pub fn clear_group(&self, group: &str) {
        let removed: Vec<Job> = {
            let mut inner = self.lock();
            let mut kept = Vec::with_capacity(inner.jobs.len());
            let mut removed = Vec::new();
            for job in inner.jobs.drain(..) {
                if job.group == group {
                    removed.push(job);
                } else {
                    kept.push(job);
                }
            }
            inner.jobs = kept;
            removed
        };
        for job in removed {
            if let Some(cleanup) = job.cleanup {
                cleanup();
            }
        }
    }

    /// Number of queued jobs in a group
    pub fn group_len(&self, group: &str) -> usize {
        self.lock().jobs.iter().filter(|j| j.group == group).count()
    }

    /// Drain and execute all currently due jobs, in insertion order.
    ///
    /// Each job is removed from the queue before its action runs, so a
    /// `clear_group` performed by one action reliably stops the rest of
    /// its group, and no job can ever fire twice. Panicking actions are
    /// logged and discarded.
    pub fn tick(&self) {
        loop {
            let job = {
                let mut inner = self.lock();
                let now = self.clock.now();
                let due = inner.jobs.iter().position(|j| match j.rule {
                    FireRule::Armed => j.time <= now + self.horizon,
                    FireRule::Deadline => j.time <= now,
                });
                match due {
                    Some(index) => inner.jobs.remove(index),
                    None => break,
                }
            };

            // Stale token: the session moved on, drop silently
            if !self.session.is_live(job.token) {
                tracing::trace!(
                    "dropping stale job {} in group {} (token {})",
                    job.id,
                    job.group,
                    job.token
                );
                continue;
            }

            let group = job.group.clone();
            if catch_unwind(AssertUnwindSafe(job.action)).is_err() {
                tracing::error!("scheduled action in group {} panicked; discarded", group);
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Background tick source
///
/// A dedicated worker thread, never a UI-coupled timer, so ticks keep
/// coming while the interface is hidden or busy. Dropping the ticker
/// stops the thread.
pub struct Ticker {
    stop: crossbeam_channel::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    pub fn spawn(scheduler: Scheduler) -> Self {
        Self::spawn_with_interval(scheduler, TICK_INTERVAL)
    }

    pub fn spawn_with_interval(scheduler: Scheduler, interval: Duration) -> Self {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let ticks = crossbeam_channel::tick(interval);
        let handle = std::thread::spawn(move || loop {
            crossbeam_channel::select! {
                recv(stop_rx) -> _ => break,
                recv(ticks) -> _ => scheduler.tick(),
            }
        });
        Self {
            stop: stop_tx,
            handle: Some(handle),
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        let _ = self.stop.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn setup(horizon: f64) -> (Arc<ManualClock>, Arc<SessionToken>, Scheduler) {
        let clock = Arc::new(ManualClock::new(0.0));
        let session = Arc::new(SessionToken::new());
        let scheduler = Scheduler::with_horizon(clock.clone(), session.clone(), horizon);
        (clock, session, scheduler)
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> usize) {
        let count = Arc::new(AtomicUsize::new(0));
        let read = {
            let count = count.clone();
            move || count.load(Ordering::SeqCst)
        };
        (count, read)
    }

    #[test]
    fn deadline_job_fires_only_after_time() {
        let (clock, _, scheduler) = setup(1.5);
        let (count, fired) = counter();

        scheduler.run_at("g", 10.0, move || {
            count.fetch_add(1, Ordering::SeqCst);
        });

        clock.set(9.9);
        scheduler.tick();
        assert_eq!(fired(), 0);

        clock.set(10.0);
        scheduler.tick();
        assert_eq!(fired(), 1);

        // Never fires twice
        scheduler.tick();
        assert_eq!(fired(), 1);
    }

    #[test]
    fn armed_job_fires_within_horizon() {
        let (clock, _, scheduler) = setup(1.5);
        let (count, fired) = counter();

        scheduler.schedule("g", 10.0, move || {
            count.fetch_add(1, Ordering::SeqCst);
        });

        clock.set(8.0);
        scheduler.tick();
        assert_eq!(fired(), 0);

        // 10.0 <= 8.6 + 1.5
        clock.set(8.6);
        scheduler.tick();
        assert_eq!(fired(), 1);
    }

    #[test]
    fn due_jobs_drain_in_insertion_order() {
        let (clock, _, scheduler) = setup(0.0);
        let order = Arc::new(Mutex::new(Vec::new()));

        for label in ["a", "b", "c"] {
            let order = order.clone();
            // identical fire times
            scheduler.run_at("g", 5.0, move || order.lock().unwrap().push(label));
        }

        clock.set(5.0);
        scheduler.tick();
        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn cancel_before_fire_has_no_side_effects() {
        let (clock, _, scheduler) = setup(1.5);
        let (count, fired) = counter();

        let id = scheduler.run_at("g", 1.0, move || {
            count.fetch_add(1, Ordering::SeqCst);
        });
        scheduler.cancel(id);

        clock.set(2.0);
        scheduler.tick();
        assert_eq!(fired(), 0);
    }

    #[test]
    fn clear_group_runs_cleanups_and_is_idempotent() {
        let (clock, _, scheduler) = setup(1.5);
        let (count, fired) = counter();
        let (cleaned, cleanups) = counter();

        scheduler.run_at_with_cleanup(
            "fade",
            1.0,
            {
                let count = count.clone();
                move || {
                    count.fetch_add(1, Ordering::SeqCst);
                }
            },
            move || {
                cleaned.fetch_add(1, Ordering::SeqCst);
            },
        );
        scheduler.run_at("other", 1.0, move || {
            count.fetch_add(10, Ordering::SeqCst);
        });

        scheduler.clear_group("fade");
        scheduler.clear_group("fade"); // idempotent
        assert_eq!(cleanups(), 1);

        clock.set(2.0);
        scheduler.tick();
        // only the other group fired
        assert_eq!(fired(), 10);
    }

    #[test]
    fn clearing_mid_tick_stops_due_groupmates() {
        let (clock, _, scheduler) = setup(0.0);
        let (count, fired) = counter();

        // First job clears the group; the second is due on the same
        // tick but must not fire
        {
            let scheduler2 = scheduler.clone();
            scheduler.run_at("g", 1.0, move || scheduler2.clear_group("g"));
        }
        scheduler.run_at("g", 1.0, move || {
            count.fetch_add(1, Ordering::SeqCst);
        });

        clock.set(1.0);
        scheduler.tick();
        assert_eq!(fired(), 0);
    }

    #[test]
    fn stale_token_drops_job_silently() {
        let (clock, session, scheduler) = setup(1.5);
        let (count, fired) = counter();

        scheduler.run_at("g", 1.0, move || {
            count.fetch_add(1, Ordering::SeqCst);
        });
        session.bump();

        clock.set(2.0);
        scheduler.tick();
        assert_eq!(fired(), 0);
        assert_eq!(scheduler.group_len("g"), 0);
    }

    #[test]
    fn panicking_action_is_discarded_and_tick_continues() {
        let (clock, _, scheduler) = setup(0.0);
        let (count, fired) = counter();

        scheduler.run_at("g", 1.0, || panic!("boom"));
        scheduler.run_at("g", 1.0, move || {
            count.fetch_add(1, Ordering::SeqCst);
        });

        clock.set(1.0);
        scheduler.tick();
        assert_eq!(fired(), 1);
        assert_eq!(scheduler.group_len("g"), 0);
    }

    #[test]
    fn ticker_drives_scheduler() {
        let clock = Arc::new(ManualClock::new(10.0));
        let session = Arc::new(SessionToken::new());
        let scheduler = Scheduler::new(clock.clone(), session);
        let (count, fired) = counter();

        scheduler.run_at("g", 1.0, move || {
            count.fetch_add(1, Ordering::SeqCst);
        });

        let ticker = Ticker::spawn_with_interval(scheduler, Duration::from_millis(5));
        // Give the ticker a few intervals
        std::thread::sleep(Duration::from_millis(60));
        drop(ticker);

        assert_eq!(fired(), 1);
    }
}

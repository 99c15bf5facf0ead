//! A cancellable, restartable repeating timer.
//!
//! The teacher's threaded-timer design (a `threading.Timer` re-armed from
//! inside its own callback) is replaced here with `tokio::time` tasks, per
//! the re-architecture guidance: reschedule happens *before* the callback
//! runs, so the callback may call [`RepeatingTimer::cancel`] on itself to
//! stop further fires without racing the next schedule.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

/// How the delay before the next fire is computed.
#[derive(Clone)]
pub enum Interval {
    /// A fixed delay, independent of attempt count.
    Fixed(Duration),
    /// A delay computed from the (1-indexed) attempt count, e.g. a backoff
    /// schedule.
    ByAttempt(Arc<dyn Fn(u32) -> Duration + Send + Sync>),
}

impl Interval {
    pub(crate) fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Interval::Fixed(d) => *d,
            Interval::ByAttempt(f) => f(attempt),
        }
    }
}

/// The default Socket reconnect schedule: 1s, 2s, 5s, 10s, then 10s forever.
pub fn default_reconnect_schedule() -> Interval {
    const SCHEDULE_MS: [u64; 4] = [1000, 2000, 5000, 10000];
    Interval::ByAttempt(Arc::new(|attempt: u32| {
        let idx = (attempt.saturating_sub(1)) as usize;
        let ms = SCHEDULE_MS.get(idx).copied().unwrap_or(10_000);
        Duration::from_millis(ms)
    }))
}

struct Inner {
    interval: Interval,
    callback: Box<dyn Fn() + Send + Sync>,
    running: AtomicBool,
    attempt: AtomicU32,
    /// Bumped on every `cancel()`; a sleeping task compares its captured
    /// generation against the current one on wake and no-ops if stale.
    generation: AtomicU64,
}

/// A repeating timer driven by `tokio::time::sleep`.
///
/// Cloning shares the same underlying schedule (cheap `Arc` clone), the way a
/// [`crate::channel::Channel`] and its rejoin timer share one logical timer
/// across the handles callers hold.
#[derive(Clone)]
pub struct RepeatingTimer {
    inner: Arc<Inner>,
}

impl RepeatingTimer {
    /// Creates a new timer with the given interval policy and callback.
    /// The timer is not running until [`RepeatingTimer::start`] is called.
    pub fn new(interval: Interval, callback: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                interval,
                callback: Box::new(callback),
                running: AtomicBool::new(false),
                attempt: AtomicU32::new(0),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Schedules the callback at the current interval if not already running.
    /// Idempotent while running.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.schedule();
    }

    /// Stops any pending fire and resets the attempt counter to zero.
    /// Safe to call whether or not the timer is running.
    pub fn cancel(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.attempt.store(0, Ordering::SeqCst);
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// The number of times this timer has fired since the last `cancel`.
    pub fn attempt(&self) -> u32 {
        self.inner.attempt.load(Ordering::SeqCst)
    }

    fn schedule(&self) {
        let attempt_for_delay = self.inner.attempt.load(Ordering::SeqCst) + 1;
        let delay = self.inner.interval.delay_for(attempt_for_delay);
        let generation = self.inner.generation.load(Ordering::SeqCst);
        let inner = self.inner.clone();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if inner.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            Self::fire(&inner, generation);
        });
    }

    fn fire(inner: &Arc<Inner>, generation: u64) {
        inner.attempt.fetch_add(1, Ordering::SeqCst);
        inner.running.store(false, Ordering::SeqCst);

        // Reschedule precedes the callback so the callback may call
        // `cancel()` on itself (via a clone sharing this `Inner`) and stop
        // further fires.
        let next = RepeatingTimer {
            inner: inner.clone(),
        };
        next.inner.running.store(true, Ordering::SeqCst);
        next.schedule();

        // If cancel() raced us between the generation check in the sleeping
        // task and here, don't invoke a stale callback either.
        if inner.generation.load(Ordering::SeqCst) == generation {
            (inner.callback)();
        }
    }
}

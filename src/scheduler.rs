//! Poll timing with an injectable clock.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Source of wall-clock time and of waiting.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&self, duration: Duration);
}

/// Real time and real sleeps.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Clock that only moves when told to. `sleep` advances it instantly.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        ManualClock {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now = now.checked_add_signed(by).unwrap_or(DateTime::<Utc>::MAX_UTC);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn sleep(&self, duration: Duration) {
        self.advance(TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX));
    }
}

/// Fixed-interval cycle timer. No cancellation: the wait always completes.
pub struct PollScheduler {
    clock: Arc<dyn Clock>,
    interval: Duration,
    cycles: u64,
}

impl PollScheduler {
    pub fn new(clock: Arc<dyn Clock>, interval: Duration) -> Self {
        PollScheduler {
            clock,
            interval,
            cycles: 0,
        }
    }

    /// Number of completed waits.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// When the next cycle is due if the wait started now.
    pub fn next_due(&self) -> DateTime<Utc> {
        let interval = TimeDelta::from_std(self.interval).unwrap_or(TimeDelta::MAX);
        self.clock
            .now()
            .checked_add_signed(interval)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Block until the next cycle is due.
    pub fn wait_for_next_cycle(&mut self) {
        self.clock.sleep(self.interval);
        self.cycles += 1;
    }
}

use chrono::{DateTime, Duration, Utc};
use std::sync::RwLock;

/// Source of "now" for hold deadlines, expiry checks and audit timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Lets tests walk a hold past its deadline.
#[derive(Debug)]
pub struct ManualClock {
    time: RwLock<DateTime<Utc>>,
    step: RwLock<Duration>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { time: RwLock::new(start), step: RwLock::new(Duration::zero()) }
    }

    /// Moves the clock forward by `step` after every read. Zero stops it.
    pub fn tick_on_read(&self, step: Duration) {
        *self.step.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = step;
    }

    pub fn advance(&self, by: Duration) {
        let mut time = self.time.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *time += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.time.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let step = *self.step.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut time = self.time.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = *time;
        *time += step;
        now
    }
}

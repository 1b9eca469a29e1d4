use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use time::OffsetDateTime;

/// Time source injected into every component with time-based behavior.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Monotonic time, used for freshness and bundling intervals.
    fn now(&self) -> Instant;

    /// Wall-clock UTC time, used for history timestamps.
    fn now_utc(&self) -> OffsetDateTime;
}

pub type SharedClock = Arc<dyn Clock>;

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    #[must_use]
    pub fn shared() -> SharedClock {
        Arc::new(Self)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn now_utc(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A cached value together with the instant it was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedValue<T> {
    pub value: T,
    pub fetched_at: Instant,
}

impl<T> TimedValue<T> {
    pub fn new(value: T, fetched_at: Instant) -> Self {
        Self { value, fetched_at }
    }

    #[must_use]
    pub fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.fetched_at) < ttl
    }

    /// Returns the value only while it is younger than `ttl`.
    pub fn fresh(&self, now: Instant, ttl: Duration) -> Option<&T> {
        self.is_fresh(now, ttl).then_some(&self.value)
    }
}

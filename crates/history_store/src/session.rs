use std::time::{Duration, Instant};

use gen_contract::TimedValue;

/// How long a remote session identifier is reused for new turns.
pub const SESSION_TTL: Duration = Duration::from_secs(300);

/// Caches the remote session that new turns are written into.
#[derive(Debug, Clone)]
pub struct SessionCache {
    ttl: Duration,
    current: Option<TimedValue<String>>,
}

impl SessionCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, current: None }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The cached identifier while it is younger than the TTL.
    pub fn current(&self, now: Instant) -> Option<&str> {
        self.current
            .as_ref()
            .and_then(|cached| cached.fresh(now, self.ttl))
            .map(String::as_str)
    }

    pub fn store(&mut self, session_id: String, now: Instant) {
        self.current = Some(TimedValue::new(session_id, now));
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new(SESSION_TTL)
    }
}

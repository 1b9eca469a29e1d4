use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use gen_contract::{Clock, SharedClock};
use time::OffsetDateTime;

use crate::lock_unpoisoned;

/// 2026-02-14T00:00:00Z
const ANCHOR_UNIX_SECONDS: i64 = 1_771_027_200;

#[derive(Debug, Clone, Copy)]
struct ClockState {
    instant: Instant,
    utc: OffsetDateTime,
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<ClockState>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        let utc = OffsetDateTime::from_unix_timestamp(ANCHOR_UNIX_SECONDS)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        Self {
            state: Mutex::new(ClockState {
                instant: Instant::now(),
                utc,
            }),
        }
    }

    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Moves both monotonic and wall-clock time forward.
    pub fn advance(&self, by: Duration) {
        let mut state = lock_unpoisoned(&self.state);
        state.instant += by;
        state.utc += by;
    }

    #[must_use]
    pub fn as_shared(self: &Arc<Self>) -> SharedClock {
        Arc::clone(self) as SharedClock
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        lock_unpoisoned(&self.state).instant
    }

    fn now_utc(&self) -> OffsetDateTime {
        lock_unpoisoned(&self.state).utc
    }
}

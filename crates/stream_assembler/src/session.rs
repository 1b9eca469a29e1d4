use std::time::{Duration, Instant};

use crate::bundler::Bundler;
use crate::heuristics::PromptClass;
use crate::state::StreamState;

/// Per-request buffers and counters. Dropped once the stream is finalized.
#[derive(Debug, Clone)]
pub struct StreamSession {
    pub id: u64,
    pub started_at: Instant,
    pub chunk_count: usize,
    pub raw_buffer: String,
    pub presentation: Bundler,
    pub state: StreamState,
    pub prompt_class: PromptClass,
    last_sequence: Option<u64>,
}

impl StreamSession {
    pub fn new(
        id: u64,
        started_at: Instant,
        prompt_class: PromptClass,
        bundle_min_chars: usize,
        bundle_interval: Duration,
    ) -> Self {
        Self {
            id,
            started_at,
            chunk_count: 0,
            raw_buffer: String::new(),
            presentation: Bundler::new(started_at, bundle_min_chars, bundle_interval),
            state: StreamState::Started,
            prompt_class,
            last_sequence: None,
        }
    }

    /// Records `sequence` if it advances the stream. Stale or repeated
    /// sequences return false and must not be applied.
    pub fn accept_sequence(&mut self, sequence: u64) -> bool {
        match self.last_sequence {
            Some(last) if sequence <= last => false,
            _ => {
                self.last_sequence = Some(sequence);
                true
            }
        }
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::StreamSession;
    use crate::heuristics::PromptClass;

    #[test]
    fn sequences_must_increase() {
        let mut session = StreamSession::new(
            1,
            Instant::now(),
            PromptClass::Elaborate,
            50,
            Duration::from_millis(100),
        );
        assert!(session.accept_sequence(0));
        assert!(session.accept_sequence(2));
        assert!(!session.accept_sequence(2));
        assert!(!session.accept_sequence(1));
        assert_eq!(session.last_sequence(), Some(2));
    }
}

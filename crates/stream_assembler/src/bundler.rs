use std::time::{Duration, Instant};

use crate::sentinels::partial_sentinel_suffix;

pub const BUNDLE_MIN_CHARS: usize = 50;
pub const BUNDLE_MAX_INTERVAL: Duration = Duration::from_millis(100);

/// Groups token text into presentation bundles.
///
/// A bundle is released when the buffer holds at least `min_chars`
/// characters, when `max_interval` has passed since the last release, or
/// immediately when incoming text contains a newline. A trailing fragment
/// that could begin a stop sentinel is held back until the next release.
#[derive(Debug, Clone)]
pub struct Bundler {
    buffer: String,
    last_flush: Instant,
    min_chars: usize,
    max_interval: Duration,
}

impl Bundler {
    pub fn new(now: Instant, min_chars: usize, max_interval: Duration) -> Self {
        Self {
            buffer: String::new(),
            last_flush: now,
            min_chars,
            max_interval,
        }
    }

    pub fn pending(&self) -> &str {
        &self.buffer
    }

    pub fn push(&mut self, text: &str, now: Instant) -> Option<String> {
        self.buffer.push_str(text);
        let due = text.contains('\n')
            || self.buffer.chars().count() >= self.min_chars
            || now.saturating_duration_since(self.last_flush) >= self.max_interval;
        if due {
            self.release(now, true)
        } else {
            None
        }
    }

    /// Releases everything still buffered.
    pub fn flush(&mut self, now: Instant) -> Option<String> {
        self.release(now, false)
    }

    /// Drops the last `bytes` bytes of buffered text, at most what is buffered.
    pub fn truncate_tail(&mut self, bytes: usize) {
        let mut keep = self.buffer.len().saturating_sub(bytes);
        while keep > 0 && !self.buffer.is_char_boundary(keep) {
            keep -= 1;
        }
        self.buffer.truncate(keep);
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    fn release(&mut self, now: Instant, hold_partial: bool) -> Option<String> {
        let held = if hold_partial {
            partial_sentinel_suffix(&self.buffer)
        } else {
            0
        };
        let split = self.buffer.len() - held;
        if split == 0 {
            return None;
        }
        let rest = self.buffer.split_off(split);
        let bundle = std::mem::replace(&mut self.buffer, rest);
        self.last_flush = now;
        Some(bundle)
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::{Bundler, BUNDLE_MAX_INTERVAL, BUNDLE_MIN_CHARS};

    fn bundler(start: Instant) -> Bundler {
        Bundler::new(start, BUNDLE_MIN_CHARS, BUNDLE_MAX_INTERVAL)
    }

    #[test]
    fn newline_releases_immediately() {
        let start = Instant::now();
        let mut bundler = bundler(start);
        assert_eq!(bundler.push("x", start), None);
        assert_eq!(bundler.push(" = 1\n", start), Some("x = 1\n".to_string()));
        assert_eq!(bundler.pending(), "");
    }

    #[test]
    fn size_threshold_releases_bundle() {
        let start = Instant::now();
        let mut bundler = bundler(start);
        assert_eq!(bundler.push(&"a".repeat(49), start), None);
        assert_eq!(bundler.push("b", start), Some(format!("{}b", "a".repeat(49))));
    }

    #[test]
    fn interval_releases_bundle() {
        let start = Instant::now();
        let mut bundler = bundler(start);
        assert_eq!(bundler.push("ab", start + Duration::from_millis(99)), None);
        assert_eq!(
            bundler.push("c", start + Duration::from_millis(100)),
            Some("abc".to_string())
        );
    }

    #[test]
    fn partial_sentinel_is_held_back_until_flush() {
        let start = Instant::now();
        let mut bundler = bundler(start);
        assert_eq!(bundler.push("x = 1\n<|end", start), Some("x = 1\n".to_string()));
        assert_eq!(bundler.pending(), "<|end");
        assert_eq!(bundler.flush(start), Some("<|end".to_string()));
    }

    #[test]
    fn truncate_tail_drops_held_fragment() {
        let start = Instant::now();
        let mut bundler = bundler(start);
        bundler.push("ok\n<|im", start);
        bundler.truncate_tail(4);
        assert_eq!(bundler.flush(start), None);
    }
}

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Bounded recency window of event fingerprints.
///
/// Replay protection only: identical events far apart in time are genuinely
/// distinct occurrences, so the window is capped by both count and age
/// rather than keeping unbounded history.
#[derive(Debug)]
pub struct DedupWindow {
    seen: VecDeque<(String, Instant)>,
    max_entries: usize,
    max_age: Duration,
}

impl DedupWindow {
    pub fn new(max_entries: usize, max_age: Duration) -> Self {
        Self {
            seen: VecDeque::with_capacity(max_entries),
            max_entries,
            max_age,
        }
    }

    /// Record a fingerprint. Returns true when it is fresh, false when it
    /// was already seen within the window (a replay).
    pub fn insert(&mut self, fingerprint: &str) -> bool {
        let now = Instant::now();
        self.evict(now);

        if self.seen.iter().any(|(fp, _)| fp == fingerprint) {
            return false;
        }

        if self.seen.len() == self.max_entries {
            self.seen.pop_front();
        }
        self.seen.push_back((fingerprint.to_string(), now));
        true
    }

    fn evict(&mut self, now: Instant) {
        while let Some((_, at)) = self.seen.front() {
            if now.duration_since(*at) > self.max_age {
                self.seen.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for DedupWindow {
    fn default() -> Self {
        Self::new(256, Duration::from_secs(30))
    }
}

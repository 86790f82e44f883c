// src/watch/debounce.rs

//! Per-binding trailing-edge debounce.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Tracks the last event time per key. A key becomes due once `window`
/// has passed without another event for it, so a burst yields one firing.
///
/// Time is passed in explicitly, which keeps this testable without a clock.
#[derive(Debug)]
pub struct Debouncer<K> {
    window: Duration,
    last_seen: BTreeMap<K, Instant>,
}

impl<K: Ord + Clone> Debouncer<K> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_seen: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, key: K, now: Instant) {
        self.last_seen.insert(key, now);
    }

    /// Remove and return every key whose window has elapsed, in key order.
    pub fn take_due(&mut self, now: Instant) -> Vec<K> {
        let due: Vec<K> = self
            .last_seen
            .iter()
            .filter(|(_, seen)| now.saturating_duration_since(**seen) >= self.window)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &due {
            self.last_seen.remove(key);
        }
        due
    }

    /// Earliest instant at which some key becomes due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.last_seen.values().min().map(|seen| *seen + self.window)
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}

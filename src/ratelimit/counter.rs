//! Fixed-window counter entries.

use chrono::{DateTime, Utc};
use std::time::Duration;

use super::clock::to_chrono;

/// A request counter for a single fixed window.
///
/// An entry whose `reset_at` is not in the future is expired and must be
/// treated as absent, whether or not it has been removed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterEntry {
    /// Requests seen in the current window
    pub count: u64,
    /// When the current window ends
    pub reset_at: DateTime<Utc>,
}

impl CounterEntry {
    /// Start a new window with its first request.
    pub fn open(now: DateTime<Utc>, window: Duration) -> Self {
        Self {
            count: 1,
            reset_at: now + to_chrono(window),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.reset_at
    }

    /// Record one request.
    ///
    /// An expired entry is reset to a fresh window rather than incremented,
    /// so the window never slides.
    pub fn hit(&mut self, now: DateTime<Utc>, window: Duration) {
        if self.is_expired(now) {
            *self = Self::open(now, window);
        } else {
            self.count = self.count.saturating_add(1);
        }
    }

    /// Time left until the window resets.
    pub fn ttl(&self, now: DateTime<Utc>) -> Duration {
        (self.reset_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}

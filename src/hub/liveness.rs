//! Connection liveness tracking
//!
//! Transport-level ping/pong, distinct from the JSON `ping`/`pong`
//! messages. Only unresponsiveness closes a connection; silence with a
//! live transport does not.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Tracks when a connection last showed signs of life
pub struct ActivityTracker {
    last_seen: Mutex<Instant>,
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityTracker {
    /// Create a tracker marked alive now
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_seen: Mutex::new(Instant::now()),
        }
    }

    /// Mark the connection alive. Called for every inbound frame,
    /// including transport pongs.
    pub fn touch(&self) {
        if let Ok(mut last_seen) = self.last_seen.lock() {
            *last_seen = Instant::now();
        }
    }

    /// How long the connection has been silent
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_seen
            .lock()
            .map_or(Duration::ZERO, |last_seen| last_seen.elapsed())
    }

    /// Whether the connection has been silent past the timeout
    #[must_use]
    pub fn is_stale(&self, timeout: Duration) -> bool {
        self.idle_for() > timeout
    }
}

// Keyweave Suspend Timer
// The single deadline that ends a suspend window

use std::time::{Duration, Instant};

/// At most one pending deadline.
///
/// While armed, modifier and multipurpose output is withheld. Re-arming
/// never shortens the window: a plain modifier press cannot cut short a
/// multipurpose key that asked for longer.
#[derive(Debug, Clone, Default)]
pub struct SuspendTimer {
    deadline: Option<Instant>,
    window: Duration,
}

impl SuspendTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Length of the window currently in force
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Start a fresh window, replacing any pending one
    pub fn arm(&mut self, now: Instant, timeout: Duration) {
        self.window = timeout;
        self.deadline = Some(now + timeout);
    }

    /// Restart the window from `now` with the longer of `timeout` and the
    /// current window
    pub fn rearm(&mut self, now: Instant, timeout: Duration) {
        self.window = self.window.max(timeout);
        self.deadline = Some(now + self.window);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
        self.window = Duration::ZERO;
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline.map_or(false, |deadline| now >= deadline)
    }

    /// Time left before the deadline, zero once due
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }
}

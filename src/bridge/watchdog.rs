//! Per-session liveness deadline.
//!
//! The session loop sleeps until [`Watchdog::deadline`] in the
//! highest-priority branch of its `select!`. Every accepted command
//! pushes the deadline out; if it passes, the loop publishes the
//! fail-safe stop directly (bypassing the rate limiter) and closes.
//!
//! Before the first command the deadline is the handshake grace period,
//! afterwards it is the regular watchdog timeout.

use std::time::Duration;

use tokio::time::Instant;

/// Deadline timer for one session.
#[derive(Debug, Clone)]
pub struct Watchdog {
    timeout: Duration,
    armed_at: Instant,
    last_reset: Option<Instant>,
    deadline: Instant,
}

impl Watchdog {
    /// Arms the watchdog at `now`. It expires after `grace` unless
    /// [`Self::reset`] is called.
    #[must_use]
    pub fn new(grace: Duration, timeout: Duration, now: Instant) -> Self {
        Self {
            timeout,
            armed_at: now,
            last_reset: None,
            deadline: now + grace,
        }
    }

    /// Records a valid command received at `now`.
    pub fn reset(&mut self, now: Instant) {
        self.last_reset = Some(now);
        self.deadline = now + self.timeout;
    }

    /// Instant at which the watchdog fires.
    #[must_use]
    pub const fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time since the last valid command (or since arming).
    #[must_use]
    pub fn silence(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_reset.unwrap_or(self.armed_at))
    }

    /// Returns `true` if at least one command has reset the watchdog.
    #[must_use]
    pub const fn has_been_fed(&self) -> bool {
        self.last_reset.is_some()
    }
}

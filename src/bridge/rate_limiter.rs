//! Latest-value rate limiter.
//!
//! Holds at most one command per robot. Every inbound command overwrites
//! the slot; every tick forwards whatever is latest, so bursts are
//! coalesced and quiet periods are filled with the last known intent.
//!
//! The limiter is a plain state machine driven by the session loop's
//! ticker. It enforces the period itself, so bunched ticks cannot produce
//! more than one publish per period.

use std::time::Duration;

use tokio::time::Instant;

use crate::domain::ControlCommand;

/// Coalesces commands to one publish per period.
#[derive(Debug)]
pub struct RateLimiter {
    period: Duration,
    latest: Option<ControlCommand>,
    last_emit: Option<Instant>,
    unpublished: bool,
    superseded: u64,
}

impl RateLimiter {
    /// Creates an empty limiter publishing at most once per `period`.
    #[must_use]
    pub const fn new(period: Duration) -> Self {
        Self {
            period,
            latest: None,
            last_emit: None,
            unpublished: false,
            superseded: 0,
        }
    }

    /// Configured publish period.
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Stores `command` as the latest intent, discarding an unpublished
    /// predecessor.
    pub fn submit(&mut self, command: ControlCommand) {
        if self.unpublished {
            self.superseded = self.superseded.saturating_add(1);
        }
        self.latest = Some(command);
        self.unpublished = true;
    }

    /// Returns the command to publish for a tick at `now`, or `None` if
    /// nothing has been received yet or the period has not elapsed since
    /// the previous emission.
    pub fn on_tick(&mut self, now: Instant) -> Option<ControlCommand> {
        let latest = self.latest?;
        if let Some(at) = self.last_emit
            && now.saturating_duration_since(at) < self.period
        {
            return None;
        }
        self.last_emit = Some(now);
        self.unpublished = false;
        Some(latest)
    }

    /// Number of commands overwritten before any tick published them.
    #[must_use]
    pub const fn superseded(&self) -> u64 {
        self.superseded
    }

    /// Drops the held command so nothing is forwarded after a stop.
    pub fn clear(&mut self) {
        self.latest = None;
        self.unpublished = false;
    }
}

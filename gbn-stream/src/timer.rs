//! Deadline timers for retransmission.
//!
//! Reliable delivery requires that unacknowledged data is re-sent if no ACK
//! arrives within a bounded time.  This module provides:
//! - [`RetransmitTimer`]: a single timer tracking the oldest
//!   unacknowledged byte of the send window.  There are no per-segment
//!   timers: the timer is armed when data enters an empty window, re-armed
//!   whenever the window base moves or a retransmission round fires, and
//!   disarmed when the window drains.
//! - [`ControlTimer`]: the bounded retry clock for SYN and FIN.
//!
//! Neither type sleeps; callers pass `now` in and ask for the next deadline,
//! which keeps the engines deterministic under test.

use std::time::{Duration, Instant};

/// Single retransmission timer with a fixed timeout.
#[derive(Debug, Clone)]
pub struct RetransmitTimer {
    timeout: Duration,
    armed_at: Option<Instant>,
}

impl RetransmitTimer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            armed_at: None,
        }
    }

    /// Start (or restart) the timer at `now`.
    pub fn arm(&mut self, now: Instant) {
        self.armed_at = Some(now);
    }

    pub fn disarm(&mut self) {
        self.armed_at = None;
    }

    /// When the timer was last armed, or `None` when idle.
    pub fn armed_at(&self) -> Option<Instant> {
        self.armed_at
    }

    /// Instant at which the timer fires.
    pub fn deadline(&self) -> Option<Instant> {
        self.armed_at.map(|t| t + self.timeout)
    }

    /// `true` once a full timeout has elapsed since the timer was armed.
    pub fn expired(&self, now: Instant) -> bool {
        self.deadline().is_some_and(|d| now >= d)
    }
}

/// Retry clock for handshake and teardown control segments.
///
/// Counts transmissions: [`ControlTimer::start`] records the first one and
/// each [`ControlTimer::retry`] adds another until the budget is spent.
#[derive(Debug, Clone)]
pub struct ControlTimer {
    interval: Duration,
    max_attempts: u32,
    attempts: u32,
    deadline: Option<Instant>,
}

impl ControlTimer {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
            attempts: 0,
            deadline: None,
        }
    }

    /// Record the first transmission at `now`.
    pub fn start(&mut self, now: Instant) {
        self.attempts = 1;
        self.deadline = Some(now + self.interval);
    }

    pub fn stop(&mut self) {
        self.deadline = None;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }

    /// Account for another transmission.  Returns `false` when the budget is
    /// exhausted, in which case nothing should be sent.
    pub fn retry(&mut self, now: Instant) -> bool {
        if self.attempts >= self.max_attempts {
            self.deadline = None;
            return false;
        }
        self.attempts += 1;
        self.deadline = Some(now + self.interval);
        true
    }
}

/// How long a driver may block on the transport: until `deadline`, but never
/// longer than `cap`.
pub fn wait_budget(deadline: Option<Instant>, now: Instant, cap: Duration) -> Duration {
    deadline.map_or(cap, |d| d.saturating_duration_since(now).min(cap))
}

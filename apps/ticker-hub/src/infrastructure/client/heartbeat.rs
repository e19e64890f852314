//! Client Heartbeat
//!
//! The client pings the hub every `ping_interval`. With a `pong_timeout`
//! configured, a ping left unanswered for longer than the timeout counts as
//! a lost link; without one, pongs are only logged.

use std::time::Duration;

use tokio::time::Instant;

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatConfig {
    /// Interval between ping frames.
    pub ping_interval: Duration,
    /// Deadline for the pong to the oldest unanswered ping, if enforced.
    pub pong_timeout: Option<Duration>,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            pong_timeout: None,
        }
    }
}

/// Per-link record of outstanding pings.
#[derive(Debug, Default)]
pub struct PongTracker {
    oldest_unanswered: Option<Instant>,
}

impl PongTracker {
    /// Record a ping sent at `now`.
    pub fn ping_sent(&mut self, now: Instant) {
        self.oldest_unanswered.get_or_insert(now);
    }

    /// Record a pong.
    pub const fn pong_received(&mut self) {
        self.oldest_unanswered = None;
    }

    /// Whether a ping has been waiting longer than `timeout`.
    #[must_use]
    pub fn is_overdue(&self, now: Instant, timeout: Duration) -> bool {
        self.oldest_unanswered
            .is_some_and(|sent| now.saturating_duration_since(sent) > timeout)
    }
}

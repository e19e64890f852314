//! Reconnection Policy
//!
//! Bounded reconnect schedule for the push channel. The default is a fixed
//! 3 s delay for at most 10 attempts; a multiplier above 1 and a jitter
//! factor turn it into exponential backoff.

use std::time::Duration;

use rand::Rng;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectConfig {
    /// Delay before the first attempt of an episode.
    pub initial_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
    /// Growth factor applied after each attempt (1.0 = fixed delay).
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.1 = ±10%).
    pub jitter_factor: f64,
    /// Attempts allowed per episode.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::fixed(Duration::from_millis(3000), 10)
    }
}

impl ReconnectConfig {
    /// Fixed delay, no jitter.
    #[must_use]
    pub const fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            jitter_factor: 0.0,
            max_attempts,
        }
    }
}

/// Reconnect attempt counter and delay schedule.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    current_delay: Duration,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a policy at the start of an episode.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            current_delay: config.initial_delay,
            config,
            attempt_count: 0,
        }
    }

    /// Schedule the next attempt.
    ///
    /// Returns `None` once `max_attempts` attempts have been scheduled in
    /// this episode.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        self.attempt_count += 1;

        let delay = self.jittered(self.current_delay);

        #[allow(clippy::cast_precision_loss)]
        let scaled = (self.current_delay.as_millis() as f64 * self.config.multiplier).round();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let next_millis = if scaled.is_finite() && scaled > 0.0 {
            scaled as u64
        } else {
            0
        };
        self.current_delay = Duration::from_millis(next_millis).min(self.config.max_delay);

        Some(delay)
    }

    /// Start a new episode after a successful connect or manual reconnect.
    pub const fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
        self.attempt_count = 0;
    }

    /// Attempts scheduled in this episode.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Whether the attempt budget is spent.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.attempt_count >= self.config.max_attempts
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return delay;
        }

        #[allow(clippy::cast_precision_loss)]
        let base = delay.as_millis() as f64;
        let range = base * self.config.jitter_factor;
        let offset: f64 = rand::rng().random_range(-range..=range);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let millis = (base + offset).max(1.0) as u64;
        Duration::from_millis(millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_fixed_three_seconds_ten_attempts() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
        for attempt in 1..=10 {
            assert_eq!(policy.next_delay(), Some(Duration::from_millis(3000)));
            assert_eq!(policy.attempt_count(), attempt);
        }
        assert!(policy.is_exhausted());
        assert_eq!(policy.next_delay(), None);
        assert_eq!(policy.attempt_count(), 10);
    }

    #[test]
    fn reset_starts_new_episode() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::fixed(Duration::from_secs(1), 2));
        let _ = policy.next_delay();
        let _ = policy.next_delay();
        assert!(policy.next_delay().is_none());

        policy.reset();
        assert_eq!(policy.attempt_count(), 0);
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(1500),
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts: 5,
        });
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(500)));
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(1000)));
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(1500)));
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn jitter_stays_in_bounds() {
        for _ in 0..100 {
            let mut policy = ReconnectPolicy::new(ReconnectConfig {
                jitter_factor: 0.1,
                ..ReconnectConfig::default()
            });
            let millis = policy.next_delay().unwrap().as_millis();
            assert!((2700..=3300).contains(&millis), "{millis}ms out of range");
        }
    }

    #[test]
    fn zero_attempts_is_immediately_exhausted() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::fixed(Duration::from_secs(1), 0));
        assert!(policy.next_delay().is_none());
    }
}

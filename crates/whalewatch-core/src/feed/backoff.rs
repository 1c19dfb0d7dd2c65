use std::time::Duration;

use crate::config::FeedConfig;

/// Exponential reconnect delay: starts at `initial`, doubles per
/// consecutive failure, never exceeds `max`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            next: initial,
        }
    }

    pub fn from_config(config: &FeedConfig) -> Self {
        Self::new(config.initial_backoff(), config.max_backoff())
    }

    /// Returns the delay to wait now and advances to the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.saturating_mul(2).min(self.max);
        delay
    }

    /// Delay the next failure will wait, without advancing.
    pub fn peek(&self) -> Duration {
        self.next
    }

    /// Called after a successful connect.
    pub fn reset(&mut self) {
        self.next = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }
}

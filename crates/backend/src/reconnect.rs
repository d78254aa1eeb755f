//! Jittered exponential back-off for backend connectivity probes.

use std::time::Duration;

use rand::Rng;

/// Delay schedule used while the backend is unreachable.
#[derive(Debug, Clone)]
pub struct Backoff {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Cap on the delay between attempts.
    pub max_delay: Duration,
    /// Multiplier applied after each failed attempt.
    pub factor: f64,
    attempt: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}

impl Backoff {
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            factor: 2.0,
            attempt: 0,
        }
    }

    /// Consecutive failures recorded since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay before the next attempt, without jitter.
    pub fn base_delay(&self) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let delay_ms = base_ms * self.factor.powi(self.attempt.min(32) as i32);
        Duration::from_millis(delay_ms.min(self.max_delay.as_millis() as f64) as u64)
    }

    /// Record a failure and return how long to wait.  Up to 25% jitter is
    /// added, never exceeding `max_delay`.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.base_delay();
        self.attempt = self.attempt.saturating_add(1);
        let jitter_ms = rand::thread_rng().gen_range(0.0..=0.25) * base.as_millis() as f64;
        (base + Duration::from_millis(jitter_ms as u64)).min(self.max_delay)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

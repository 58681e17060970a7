use rand::Rng;
use std::time::Duration;

/// Trait for defining reconnection strategies
///
/// Connection loss is never fatal: a strategy only decides how long to wait
/// before the next attempt. The driver keeps asking until `disconnect()`.
pub trait ReconnectionStrategy: Send + Sync {
    /// Get the delay before the next reconnection attempt
    ///
    /// # Arguments
    /// * `attempt` - Consecutive failed attempts so far (0-indexed), reset
    ///   after every successful open
    fn next_delay(&self, attempt: usize) -> Duration;
}

/// Exponential backoff reconnection strategy
///
/// Delays grow as `initial_delay * 2^attempt`, capped at `max_delay`. With a
/// non-zero jitter fraction, up to that fraction of the delay is randomly
/// shaved off so that many clients do not retry in lockstep.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    jitter: f64,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff strategy without jitter
    ///
    /// # Arguments
    /// * `initial_delay` - The delay before the first retry
    /// * `max_delay` - The maximum delay between retries
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            jitter: 0.0,
        }
    }

    /// Set the jitter fraction, clamped into `[0, 1]`; NaN and infinities disable jitter
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = if jitter.is_finite() {
            jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    /// Delay for `attempt` before jitter is applied
    pub fn base_delay(&self, attempt: usize) -> Duration {
        let initial = self.initial_delay.as_millis() as u64;
        let factor = 2u64.checked_pow(attempt.min(u32::MAX as usize) as u32).unwrap_or(u64::MAX);
        let delay = initial.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay.as_millis() as u64))
    }
}

impl ReconnectionStrategy for ExponentialBackoff {
    fn next_delay(&self, attempt: usize) -> Duration {
        let delay = self.base_delay(attempt);
        if self.jitter <= 0.0 {
            return delay;
        }

        let shave = rand::thread_rng().gen_range(0.0..=self.jitter);
        delay.mul_f64(1.0 - shave)
    }
}

/// Fixed delay reconnection strategy
///
/// Always waits the same amount of time between reconnection attempts
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl ReconnectionStrategy for FixedDelay {
    fn next_delay(&self, _attempt: usize) -> Duration {
        self.delay
    }
}

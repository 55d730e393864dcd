//! Bounded exponential backoff with jitter between acquire attempts.

use rand::Rng;
use std::time::Duration;

/// How many times to attempt an acquire and how long to wait in between.
///
/// Attempt `n` (zero-based) that fails is followed by a wait of
/// `base_delay * 2^n` plus up to `max_jitter` of random jitter. No wait
/// follows the final attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, at least 1.
    pub max_retries: u32,

    /// Wait after the first failed attempt.
    pub base_delay: Duration,

    /// Upper bound (inclusive) of the jitter added to every wait.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_jitter: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Wait after failed attempt `attempt`, without jitter.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Wait after failed attempt `attempt`, with jitter drawn from `rng`.
    pub fn delay_for<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let max_jitter_ms = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter = Duration::from_millis(rng.gen_range(0..=max_jitter_ms));
        self.base_delay_for(attempt).saturating_add(jitter)
    }

    /// Waits a caller sits through before `acquire` gives up, ignoring jitter.
    pub fn waits(&self) -> Vec<Duration> {
        (0..self.max_retries.saturating_sub(1))
            .map(|attempt| self.base_delay_for(attempt))
            .collect()
    }

    /// Upper bound on the total time spent sleeping by one `acquire`.
    pub fn worst_case_wait(&self) -> Duration {
        self.waits()
            .into_iter()
            .fold(Duration::ZERO, |total, wait| {
                total.saturating_add(wait).saturating_add(self.max_jitter)
            })
    }
}

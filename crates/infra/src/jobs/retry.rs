//! Retry policy for dispatch messages whose job is not yet visible.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential backoff for the "job not found yet" path.
///
/// The delay before re-delivery after attempt `n` is `base_delay * 2^n`, so with
/// the defaults a message is retried after 2s, 4s, 8s, 16s, 32s. Attempts are
/// 1-indexed; attempt `max_attempts` is the last one that may reschedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of delivery attempts that may be rescheduled
    pub max_attempts: u32,
    /// Unit multiplied by `2^attempt`
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Policy that never reschedules.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    /// Whether attempt `attempt` may still reschedule itself.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }

    /// Delay before re-delivering after attempt `attempt` (`base * 2^attempt`).
    ///
    /// Saturates instead of overflowing for large attempt numbers.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// The full backoff schedule, one delay per reschedulable attempt.
    pub fn schedule(&self) -> Vec<Duration> {
        (1..=self.max_attempts)
            .map(|attempt| self.delay_for_attempt(attempt))
            .collect()
    }
}

//! Retry policy: decides whether a failed delivery is retried and when.

use std::time::Duration;

use super::Message;

/// The next action for a message whose delivery just failed.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Back to pending, eligible again after `delay`.
    Retry { delay: Duration, reason: String },

    /// Retry budget exhausted; dead-letter it.
    DeadLetter { reason: String },
}

/// Retry policy for failed deliveries.
///
/// Delay grows exponentially: `base_delay * multiplier^(retry_count - 1)`,
/// capped at `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            base_delay,
            multiplier,
            max_delay,
        }
    }

    /// Requeue without waiting.
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO, 1.0, Duration::ZERO)
    }

    /// Delay before the next attempt given `retry_count` failures so far (1-indexed).
    ///
    /// Example with base_delay=1s, multiplier=2.0:
    /// - 1st failure: 1s
    /// - 2nd failure: 2s
    /// - 3rd failure: 4s
    pub fn next_delay(&self, retry_count: u32) -> Duration {
        let exponent = i32::try_from(retry_count.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Pure decision; the caller applies it to the record.
    ///
    /// `message.retry_count` must already include the failure being decided on.
    pub fn decide(&self, message: &Message) -> RetryDecision {
        if message.retry_count >= message.max_retries {
            RetryDecision::DeadLetter {
                reason: format!(
                    "retries exhausted: {}/{}",
                    message.retry_count, message.max_retries
                ),
            }
        } else {
            let delay = self.next_delay(message.retry_count);
            RetryDecision::Retry {
                delay,
                reason: format!(
                    "retry {}/{} after {:?}",
                    message.retry_count, message.max_retries, delay
                ),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 2.0, Duration::from_secs(60))
    }
}

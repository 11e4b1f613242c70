//! Per-batch retry envelope
//!
//! Jittered exponential backoff around each scan query:
//! `sleep = uniform(0, min(cap, base * 2^attempt))`. Only errors classified
//! retriable by [`crate::common::error::Error::is_retriable`] are retried;
//! everything else escapes on the first attempt. The scanner drives the
//! loop; this type only owns the arithmetic.

use std::time::Duration;

use rand::Rng;

/// Retry policy for transient query failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Base delay before exponential growth.
    base: Duration,
    /// Cap on any single delay.
    cap: Duration,
    /// Total attempts (first try included).
    max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(300),
            cap: Duration::from_millis(5000),
            max_attempts: 10,
        }
    }
}

impl RetryPolicy {
    /// Create a builder.
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }

    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Total attempts (first try included).
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether another attempt is allowed after `attempt` failures.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }

    /// Upper edge of the jitter window for a given attempt.
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        self.base
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.cap)
    }

    /// Sampled delay: uniform over `[0, backoff_ceiling(attempt)]`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let ceiling = self.backoff_ceiling(attempt);
        if ceiling.is_zero() {
            return ceiling;
        }
        let micros = rand::thread_rng().gen_range(0..=ceiling.as_micros() as u64);
        Duration::from_micros(micros)
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct RetryPolicyBuilder {
    base: Option<Duration>,
    cap: Option<Duration>,
    max_attempts: Option<u32>,
}

impl RetryPolicyBuilder {
    /// Set the base delay.
    pub fn base(mut self, base: Duration) -> Self {
        self.base = Some(base);
        self
    }

    /// Set the delay cap.
    pub fn cap(mut self, cap: Duration) -> Self {
        self.cap = Some(cap);
        self
    }

    /// Set total attempts (minimum 1).
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts.max(1));
        self
    }

    /// Build the policy, falling back to defaults for unset fields.
    pub fn build(self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            base: self.base.unwrap_or(defaults.base),
            cap: self.cap.unwrap_or(defaults.cap),
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts),
        }
    }
}

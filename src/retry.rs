//! Retry and exponential backoff policy.
//!
//! A failed attempt is retried when no response was received or the server
//! answered with a 5xx status, up to `max_retries` times. The delay before
//! retry `n` (1-based) is `base_delay * 2^(n-1)`, capped at `max_delay`:
//! 1 s, 2 s, 4 s, 8 s, 10 s, ... with the defaults.
//!
//! Only idempotent methods are retried automatically. POST and PATCH are
//! retried when the call carries an idempotency key or when
//! [`RetryPolicy::retry_non_idempotent`] is set.

use std::time::Duration;

use rand::Rng;
use reqwest::Method;

use crate::classify::TransportOutcome;

/// Randomization applied to backoff delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Jitter {
    /// Exact exponential delays.
    #[default]
    None,
    /// Uniform in `[0, delay]`.
    Full,
    /// `delay / 2` plus uniform in `[0, delay / 2]`.
    Equal,
}

/// Outcome of a retry decision for one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    /// Whether to send the request again.
    pub should_retry: bool,
    /// How long to wait first. Zero when not retrying.
    pub delay: Duration,
}

impl RetryDecision {
    const STOP: RetryDecision = RetryDecision {
        should_retry: false,
        delay: Duration::ZERO,
    };
}

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Randomization of delays.
    pub jitter: Jitter,
    /// Retry POST/PATCH even without an idempotency key.
    pub retry_non_idempotent: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(10_000),
            jitter: Jitter::None,
            retry_non_idempotent: false,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Whether a failure is retryable after `attempt_count` retries so far.
    pub fn should_retry(&self, outcome: &TransportOutcome, attempt_count: u32) -> bool {
        if attempt_count >= self.max_retries {
            return false;
        }
        match outcome {
            TransportOutcome::NoResponse { .. } => true,
            TransportOutcome::Response { status, .. } => *status >= 500,
            TransportOutcome::RequestBuildFailed => false,
        }
    }

    /// Delay before retry number `attempt_count` (1-based).
    pub fn compute_delay(&self, attempt_count: u32) -> Duration {
        let exponent = attempt_count.saturating_sub(1);
        let delay = 2u32
            .checked_pow(exponent)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay));
        self.apply_jitter(delay)
    }

    /// Whether requests with `method` may be retried at all.
    pub fn allows_method(&self, method: &Method, has_idempotency_key: bool) -> bool {
        method.is_idempotent() || has_idempotency_key || self.retry_non_idempotent
    }

    /// Full decision for a failed attempt.
    ///
    /// `retry_count` is the number of retries already made for this request.
    pub fn decide(
        &self,
        outcome: &TransportOutcome,
        retry_count: u32,
        method: &Method,
        has_idempotency_key: bool,
    ) -> RetryDecision {
        if !self.allows_method(method, has_idempotency_key)
            || !self.should_retry(outcome, retry_count)
        {
            return RetryDecision::STOP;
        }
        RetryDecision {
            should_retry: true,
            delay: self.compute_delay(retry_count + 1),
        }
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        match self.jitter {
            Jitter::None => delay,
            Jitter::Full => Duration::from_millis(rand::thread_rng().gen_range(0..=millis)),
            Jitter::Equal => {
                let half = millis / 2;
                Duration::from_millis(half + rand::thread_rng().gen_range(0..=millis - half))
            }
        }
    }
}

//! Bounded exponential backoff for rate-limited calls
//!
//! [`RetryPolicy::decide`] is a pure function of the attempt number and the
//! failure kind. [`RetryPolicy::execute`] drives an operation through it.

use crate::clock::Timer;
use crate::error::{FailureKind, LockerError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Default number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before the first retry
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Outcome of a retry decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub retry: bool,
    pub delay: Duration,
}

impl RetryDecision {
    fn give_up() -> Self {
        Self {
            retry: false,
            delay: Duration::ZERO,
        }
    }
}

/// Retry policy: only `RateLimited` failures are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Decide whether attempt number `attempt` (0-based) should be retried
    /// after failing with `kind`, and how long to wait first.
    ///
    /// Delay is `2^attempt * base_delay`.
    pub fn decide(&self, attempt: u32, kind: FailureKind) -> RetryDecision {
        if kind != FailureKind::RateLimited || attempt >= self.max_retries {
            return RetryDecision::give_up();
        }

        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        RetryDecision {
            retry: true,
            delay: self.base_delay.saturating_mul(factor),
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// runs out of retries.
    ///
    /// Exhaustion surfaces as [`LockerError::ServerBusy`].
    pub async fn execute<T, F, Fut>(&self, timer: &dyn Timer, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let kind = err.kind();
            let decision = self.decide(attempt, kind);
            if decision.retry {
                warn!(
                    attempt,
                    delay_ms = decision.delay.as_millis() as u64,
                    "Server busy, retrying"
                );
                timer.sleep(decision.delay).await;
                attempt += 1;
                continue;
            }

            if kind == FailureKind::RateLimited {
                return Err(LockerError::ServerBusy {
                    attempts: attempt + 1,
                });
            }
            return Err(err);
        }
    }
}

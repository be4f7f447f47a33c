//! Retry with exponential backoff, and a timeout wrapper.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::CommonError;

/// Backoff policy for a fallible async operation.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. 1 means no retries.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each retry.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Fixed number of attempts with the default backoff curve.
    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Delay preceding the given attempt (1-indexed; attempt 1 never waits).
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let scaled =
            self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32 - 2);
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }
}

/// Run `operation` until it succeeds or the policy is exhausted.
///
/// Returns the last error when every attempt fails.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut last_error = None;

    for attempt in 1..=policy.max_attempts.max(1) {
        if attempt > 1 {
            let delay = policy.delay_before(attempt);
            debug!(attempt, ?delay, "retrying after backoff");
            sleep(delay).await;
        }

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "succeeded after retries");
                }
                return Ok(value);
            }
            Err(e) => {
                warn!(attempt, max_attempts = policy.max_attempts, error = %e, "attempt failed");
                last_error = Some(e);
            }
        }
    }

    // max_attempts.max(1) guarantees at least one iteration ran.
    Err(last_error.expect("retry loop ran at least once"))
}

/// Run an operation with a deadline.
pub async fn with_timeout<T, F, Fut>(deadline: Duration, operation: F) -> Result<T, CommonError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    tokio::time::timeout(deadline, operation())
        .await
        .map_err(|_| CommonError::Timeout(deadline))
}

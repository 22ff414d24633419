//! # Retryable Operation Executor
//!
//! Runs one side-effecting operation under a bounded attempt budget. The operation
//! classifies its own failures through [`Retryable`]: retryable failures are attempted
//! again until the budget runs out, anything else aborts on the spot.
//!
//! The executor keeps no state between calls. Whether re-running an operation is safe
//! is the caller's concern.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Classification of a failure for the executor.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Attempt budget for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero is treated as one.
    pub max_attempts: u32,
    /// Pause between attempts. Zero by default.
    pub interval: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            interval: Duration::ZERO,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    fn attempt_cap(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS)
    }
}

/// Why an executed operation did not succeed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RetryError<E: std::error::Error + 'static> {
    /// The operation failed with an error that must not be retried.
    #[error("non-retryable failure on attempt {attempts}: {source}")]
    NonRetryable { attempts: u32, source: E },
    /// Every allowed attempt failed with a retryable error.
    #[error("retries exhausted after {attempts} attempts: {source}")]
    Exhausted { attempts: u32, source: E },
}

impl<E: std::error::Error + 'static> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::NonRetryable { attempts, .. } | RetryError::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn into_source(self) -> E {
        match self {
            RetryError::NonRetryable { source, .. } | RetryError::Exhausted { source, .. } => {
                source
            }
        }
    }
}

/// Runs `operation` until it succeeds, fails non-retryably, or the policy is spent.
///
/// # Arguments
///
/// * `policy` - Attempt budget.
/// * `name` - Operation name used in log fields.
/// * `operation` - Factory producing one attempt's future.
pub async fn execute<T, E, F, Fut>(
    policy: &RetryPolicy,
    name: &str,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    E: std::error::Error + Retryable + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let cap = policy.attempt_cap();
    let mut attempt = 0;
    loop {
        attempt += 1;
        debug!(operation = name, attempt, "Attempt");
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => {
                warn!(operation = name, attempt, error = %e, "Non-retryable failure");
                return Err(RetryError::NonRetryable {
                    attempts: attempt,
                    source: e,
                });
            }
            Err(e) if attempt >= cap => {
                warn!(operation = name, attempt, error = %e, "Retries exhausted");
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    source: e,
                });
            }
            Err(e) => {
                debug!(operation = name, attempt, error = %e, "Retryable failure");
                if !policy.interval.is_zero() {
                    tokio::time::sleep(policy.interval).await;
                }
            }
        }
    }
}

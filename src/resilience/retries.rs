//! Retry logic.
//!
//! # Responsibilities
//! - Run an async operation up to a bounded number of attempts
//! - Wait a fixed interval between attempts (no backoff, no jitter)
//! - Report the last error together with the attempt count
//!
//! # Design Decisions
//! - The first attempt runs immediately; only retries wait
//! - Suspension is an explicit sleep, not a recurring timer
//! - Callers decide which outcomes count as failures

use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Bounded retry with a fixed interval between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedRetry {
    pub max_attempts: u32,
    pub interval: Duration,
}

/// All attempts failed.
#[derive(Debug, Error)]
#[error("failed after {attempts} attempts: {last_error}")]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

impl FixedRetry {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }

    /// Run `operation` until it succeeds or the attempts run out.
    ///
    /// `label` only appears in log lines.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, RetryExhausted<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.max_attempts => {
                    return Err(RetryExhausted {
                        attempts: attempt,
                        last_error: e,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        target_name = %label,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(self.interval).await;
                }
            }
        }
    }
}

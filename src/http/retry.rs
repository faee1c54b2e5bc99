//! Retry policy for connection-level failures.
//!
//! Only failures where no HTTP response was received are retried. A response
//! from the primary, whatever its status, is final.

use log::{debug, warn};
use reqwest::Method;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Number of retries after the first attempt.
pub const DEFAULT_RETRIES: usize = 3;

/// Upper bound for a single backoff delay.
pub const BACKOFF_MAX: Duration = Duration::from_secs(120);

const DEFAULT_BACKOFF_FACTOR: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub total: usize,
    pub backoff_factor: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            total: DEFAULT_RETRIES,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            total: 0,
            backoff_factor: Duration::ZERO,
        }
    }

    /// Delay before the given retry (1-based).
    ///
    /// The first retry happens immediately, later ones wait
    /// `backoff_factor * 2^(retry - 1)`, capped at [`BACKOFF_MAX`].
    pub fn backoff(&self, retry: usize) -> Duration {
        if retry <= 1 {
            return Duration::ZERO;
        }
        let exponent = u32::try_from(retry - 1).unwrap_or(u32::MAX);
        let multiplier = 2u32.saturating_pow(exponent);
        self.backoff_factor
            .saturating_mul(multiplier)
            .min(BACKOFF_MAX)
    }
}

/// Methods that can be replayed without changing the outcome.
pub fn is_idempotent(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::PUT | Method::DELETE | Method::OPTIONS | Method::TRACE
    )
}

/// Decides whether a failed exchange may be attempted again.
///
/// Connection failures are retried for every method since the request never
/// reached the primary. Timeouts and broken exchanges are only retried for
/// idempotent methods.
pub fn should_retry(error: &reqwest::Error, idempotent: bool) -> bool {
    if error.status().is_some() {
        return false;
    }
    if error.is_connect() {
        return true;
    }
    idempotent && (error.is_timeout() || error.is_request() || error.is_body())
}

/// Runs `operation` until it succeeds, fails with an error `retryable`
/// rejects, or the policy is exhausted.
pub async fn with_retry<F, Fut, T, E, R>(
    policy: &RetryPolicy,
    operation_name: &str,
    retryable: R,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: Display,
{
    let attempts = policy.total + 1;
    let mut retry = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !retryable(&e) {
                    debug!("{}: non-retryable error: {}", operation_name, e);
                    return Err(e);
                }

                if retry >= policy.total {
                    warn!(
                        "{}: failed after {} attempts ({})",
                        operation_name, attempts, e
                    );
                    return Err(e);
                }

                retry += 1;
                let delay = policy.backoff(retry);
                warn!(
                    "{}: attempt {}/{} failed ({}), retrying in {}ms...",
                    operation_name,
                    retry,
                    attempts,
                    e,
                    delay.as_millis()
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

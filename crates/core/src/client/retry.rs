//! Rate-limited retry loop for catalog calls.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::catalog::{CatalogError, FailureClass};
use crate::metrics::{REMOTE_REQUESTS, REMOTE_RETRIES};
use crate::rate_limit::RateLimiter;

/// How often and how patiently to retry a catalog call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts including the first one.
    pub max_attempts: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            min_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(600),
        }
    }

    /// Random pause in `[min_backoff, max_backoff)`.
    pub fn backoff(&self) -> Duration {
        if self.max_backoff <= self.min_backoff {
            return self.min_backoff;
        }
        rand::thread_rng().gen_range(self.min_backoff..self.max_backoff)
    }
}

/// Run `op` until it succeeds or fails in a way that must not be retried.
///
/// Every attempt takes a token from `limiter` first, so retries spend quota
/// like any other request. Quota, non-recoverable and unexpected failures are
/// returned straight away; retryable ones are returned once `max_attempts`
/// is used up.
pub async fn with_retry<F, Fut, T>(
    operation: &str,
    policy: &RetryPolicy,
    limiter: &RateLimiter,
    op: F,
) -> Result<T, CatalogError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, CatalogError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        limiter.consume().await;

        let err = match op().await {
            Ok(value) => {
                REMOTE_REQUESTS
                    .with_label_values(&[operation, "success"])
                    .inc();
                if attempt > 1 {
                    debug!(operation, attempt, "Catalog call succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        REMOTE_REQUESTS.with_label_values(&[operation, "error"]).inc();

        match err.class() {
            FailureClass::QuotaExceeded => {
                warn!(operation, error = %err, "API rate limit exceeded");
                return Err(err);
            }
            FailureClass::NonRecoverable => {
                warn!(
                    operation,
                    attempt,
                    max_attempts,
                    error = %err,
                    "Catalog call failed with non-recoverable error"
                );
                return Err(err);
            }
            FailureClass::Unexpected => {
                error!(
                    operation,
                    attempt,
                    max_attempts,
                    error = %err,
                    "Catalog call failed unexpectedly"
                );
                return Err(err);
            }
            FailureClass::Retryable if attempt >= max_attempts => {
                warn!(
                    operation,
                    attempt,
                    max_attempts,
                    error = %err,
                    "Catalog call failed, giving up"
                );
                return Err(err);
            }
            FailureClass::Retryable => {
                let delay = policy.backoff();
                warn!(
                    operation,
                    attempt,
                    max_attempts,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "Catalog call failed, retrying"
                );
                REMOTE_RETRIES.with_label_values(&[operation]).inc();
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

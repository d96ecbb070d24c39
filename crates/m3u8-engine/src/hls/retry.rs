// Backoff for playlist, key and segment requests.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::DownloadError;

/// Exponential backoff: `base * 2^n`, capped, with optional random jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Upper bound for any single wait, jitter included
    pub max_delay: Duration,
    /// Add up to half of `base_delay` at random
    pub jitter: bool,
}

impl RetryPolicy {
    /// Retry without sleeping in between.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    /// Wait before retry number `retry` (0 for the first retry).
    pub(crate) fn delay_for_attempt(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        let delay = self.base_delay.saturating_mul(factor).min(self.max_delay);
        if !self.jitter || delay >= self.max_delay {
            return delay;
        }

        let spread = (self.base_delay / 2).min(self.max_delay - delay);
        if spread.is_zero() {
            return delay;
        }
        let extra = rand::rng().random_range(Duration::ZERO..spread);
        delay + extra
    }

    pub(crate) async fn backoff(&self, retry: u32) {
        let delay = self.delay_for_attempt(retry);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Run `request` until it succeeds, fails with an error that
/// [`DownloadError::is_retryable`] rejects, or the policy runs out of retries.
///
/// `request` receives the 0-based attempt number; `what` names the request in logs.
pub async fn retry_request<F, Fut, T>(
    policy: &RetryPolicy,
    what: &str,
    request: F,
) -> Result<T, DownloadError>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<T, DownloadError>>,
{
    let mut attempt = 0;
    loop {
        let err = match request(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_retryable() {
            debug!(what, error = %err, "Not retrying");
            return Err(err);
        }
        if attempt >= policy.max_retries {
            warn!(what, attempts = attempt + 1, error = %err, "Giving up");
            return Err(err);
        }

        let delay = policy.delay_for_attempt(attempt);
        warn!(
            what,
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Request failed, retrying"
        );
        policy.backoff(attempt).await;
        attempt += 1;
    }
}

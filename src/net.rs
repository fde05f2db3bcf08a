//! Retry with exponential backoff for query fetchers.
//!
//! 429s go through the same schedule as every other failure; the backoff
//! already gives the server room.

use std::future::Future;
use std::time::Duration;

use crate::constants::retry;
use crate::error::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first failure. Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: retry::MAX_RETRIES,
            base_delay: Duration::from_millis(retry::BASE_DELAY_MS),
            max_delay: Duration::from_millis(retry::MAX_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Fail on the first error.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// `min(base * 2^retry_index, max)`; `retry_index` is 0 for the first retry.
    pub fn delay_for(&self, retry_index: u32) -> Duration {
        let factor = 1u32.checked_shl(retry_index).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Run `attempt` until it succeeds or the policy gives up.
///
/// `on_failure` sees the running failure count after every failed attempt,
/// including the last one.
pub async fn run_with_retry<T, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    mut attempt: F,
    mut on_failure: impl FnMut(u32, &FetchError),
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut failures = 0u32;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                failures += 1;
                on_failure(failures, &err);
                if failures > policy.max_retries {
                    log::warn!("[net] {label} giving up after {failures} attempt(s): {err}");
                    return Err(err);
                }
                let back = policy.delay_for(failures - 1);
                log::warn!(
                    "[net] {label} retry={failures} backoff={}ms : {err}",
                    back.as_millis()
                );
                tokio::time::sleep(back).await;
            }
        }
    }
}

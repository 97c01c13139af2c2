use overseer_core::OverseerError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{info, warn};

/// Retry behaviour for outbound calls to reasoning backends and workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub backoff_base_ms: u64,
    /// Maximum delay in milliseconds (cap for exponential backoff).
    pub backoff_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff_base_ms: 0,
            backoff_max_ms: 0,
        }
    }
}

/// Whether an error is transient and worth retrying.
///
/// Rate limits (429), timeouts and server errors (5xx) are retryable.
/// Client errors such as 400 are not.
pub fn is_retryable(err: &OverseerError) -> bool {
    let lower = err.to_string().to_lowercase();

    if lower.contains("400") || lower.contains("404") {
        return false;
    }

    lower.contains("429")
        || lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("connection")
        || lower.contains("5xx")
        || lower.contains("500")
        || lower.contains("502")
        || lower.contains("503")
        || lower.contains("504")
}

/// Exponential backoff delay for `attempt`, capped at `backoff_max_ms`.
pub fn compute_backoff(policy: &RetryPolicy, attempt: u32) -> u64 {
    let delay = policy
        .backoff_base_ms
        .saturating_mul(2u64.saturating_pow(attempt));
    delay.min(policy.backoff_max_ms)
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy is exhausted. Returns the last error on failure.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, OverseerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, OverseerError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if !is_retryable(&e) {
                    warn!(call = label, attempt, error = %e, "Non-retryable error");
                    return Err(e);
                }
                if attempt >= policy.max_retries {
                    warn!(call = label, attempt, error = %e, "Retries exhausted");
                    return Err(e);
                }
                let delay = compute_backoff(policy, attempt);
                info!(
                    call = label,
                    attempt,
                    delay_ms = delay,
                    error = %e,
                    "Retryable error, backing off"
                );
                if delay > 0 {
                    tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                }
                attempt += 1;
            }
        }
    }
}

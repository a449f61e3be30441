//! Bounded retry for upstream provider calls.
//!
//! Providers classify their own failures; this module only decides
//! whether and when to call again. Retries apply to transient errors
//! (timeouts, connection failures, 429/5xx) and never to authentication
//! or other request errors.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::Result;

/// Retry policy for transient upstream failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each subsequent retry.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// A policy with the given retry count and the default 500 ms base delay.
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries, ..Self::default() }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 2, base_delay: Duration::from_millis(500) }
    }
}

/// Run `op`, retrying with exponential backoff while the error is
/// retryable and the policy's budget is not exhausted.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, op_name: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.base_delay * 2u32.saturating_pow(attempt);
                attempt += 1;
                warn!(
                    op = op_name,
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient upstream failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Map a reqwest transport error to the retryable taxonomy.
///
/// Timeouts and connection failures are transient; anything else is a
/// plain embedding error and is not retried.
#[cfg(any(feature = "openai", feature = "ollama"))]
pub(crate) fn classify_transport_error(
    provider: &str,
    timeout: Duration,
    e: reqwest::Error,
) -> crate::error::RagError {
    use crate::error::RagError;

    if e.is_timeout() {
        RagError::UpstreamTimeout { provider: provider.into(), seconds: timeout.as_secs() }
    } else if e.is_connect() {
        RagError::UpstreamUnavailable {
            provider: provider.into(),
            message: format!("connection failed: {e}"),
        }
    } else {
        RagError::EmbeddingError {
            provider: provider.into(),
            message: format!("request failed: {e}"),
        }
    }
}

/// Build a reqwest client with a per-request timeout.
#[cfg(any(feature = "openai", feature = "ollama"))]
pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder().timeout(timeout).build().map_err(|e| {
        crate::error::RagError::EmbeddingError {
            provider: "http".into(),
            message: format!("failed to build HTTP client: {e}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::RagError;

    #[tokio::test]
    async fn retries_transient_errors_up_to_budget() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy { max_retries: 2, base_delay: Duration::from_millis(1) };

        let result: Result<()> = with_retry(&policy, "embed", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(RagError::UpstreamUnavailable {
                    provider: "test".into(),
                    message: "503".into(),
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3); // initial + 2 retries
    }

    #[tokio::test]
    async fn non_transient_errors_fail_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result: Result<()> = with_retry(&policy, "embed", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(RagError::EmbeddingError {
                    provider: "test".into(),
                    message: "API returned 401".into(),
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn success_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy { max_retries: 2, base_delay: Duration::from_millis(1) };

        let result = with_retry(&policy, "generate", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(RagError::UpstreamTimeout { provider: "test".into(), seconds: 1 })
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}

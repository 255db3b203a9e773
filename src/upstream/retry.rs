// =============================================================================
// Upstream Fetcher: bounded retries with exponential backoff
// =============================================================================
//
// Wraps one upstream call. Any error (transport, non-2xx status, malformed
// body, provider notice) consumes an attempt. With `max_retries = n` a call
// is attempted at most `n + 1` times, sleeping `initial_backoff`, then twice
// that, and so on between attempts.
//
// Errors never escape: callers always receive a terminal `FetchResult`.
// =============================================================================

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    300
}

/// Retry tunables for upstream calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Sleep before the first retry; doubles after each failed retry.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
        }
    }
}

/// Terminal outcome of a retried upstream call.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult<T> {
    Success(T),
    Failure { reason: String, attempts: u32 },
}

impl<T> FetchResult<T> {
    /// The payload, discarding the failure reason.
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure { .. } => None,
        }
    }
}

/// Runs upstream calls under a fixed [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct UpstreamFetcher {
    policy: RetryPolicy,
}

impl UpstreamFetcher {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Run `call` under this fetcher's policy. `resource` only labels logs.
    pub async fn fetch<T, F, Fut>(&self, resource: &str, call: F) -> FetchResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        fetch_with_retry(
            resource,
            self.policy.max_retries,
            Duration::from_millis(self.policy.initial_backoff_ms),
            call,
        )
        .await
    }
}

/// Attempt `call` up to `max_retries + 1` times with doubling backoff.
///
/// Dropping the returned future cancels both the in-flight call and any
/// pending backoff sleep.
pub async fn fetch_with_retry<T, F, Fut>(
    resource: &str,
    max_retries: u32,
    initial_backoff: Duration,
    mut call: F,
) -> FetchResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut backoff = initial_backoff;
    let mut attempts = 0_u32;

    loop {
        attempts += 1;
        match call().await {
            Ok(value) => {
                if attempts > 1 {
                    debug!(resource, attempts, "upstream call recovered");
                }
                return FetchResult::Success(value);
            }
            Err(e) if attempts <= max_retries => {
                warn!(
                    resource,
                    attempt = attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "upstream call failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
            Err(e) => {
                warn!(resource, attempts, error = %e, "upstream call failed, giving up");
                return FetchResult::Failure {
                    reason: format!("{e:#}"),
                    attempts,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt() {
        let calls = AtomicU32::new(0);
        let result = fetch_with_retry("flaky", 3, Duration::from_millis(300), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    anyhow::bail!("HTTP error! status: 503");
                }
                Ok(n)
            }
        })
        .await;

        assert_eq!(result, FetchResult::Success(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_stops_after_max_retries_plus_one() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();
        let result: FetchResult<()> =
            fetch_with_retry("down", 3, Duration::from_millis(300), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { anyhow::bail!("connection refused") }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match result {
            FetchResult::Failure { reason, attempts } => {
                assert_eq!(attempts, 4);
                assert!(reason.contains("connection refused"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        // 300 + 600 + 1200 ms of backoff, none after the final attempt.
        assert!(started.elapsed() >= Duration::from_millis(2_100));
        assert!(started.elapsed() < Duration::from_millis(2_400));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_retries_means_single_attempt() {
        let calls = AtomicU32::new(0);
        let fetcher = UpstreamFetcher::new(RetryPolicy {
            max_retries: 0,
            initial_backoff_ms: 300,
        });
        let result: FetchResult<()> = fetcher
            .fetch("once", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { anyhow::bail!("nope") }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(result.ok().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_during_backoff_stops_further_attempts() {
        let calls = AtomicU32::new(0);
        let fetch = fetch_with_retry::<(), _, _>("slow", 3, Duration::from_millis(300), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { anyhow::bail!("HTTP error! status: 502") }
        });

        // The first attempt fails at once; the caller leaves during the 300 ms sleep.
        let outcome = tokio::time::timeout(Duration::from_millis(100), fetch).await;
        assert!(outcome.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn default_policy_matches_service_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.initial_backoff_ms, 300);
    }
}

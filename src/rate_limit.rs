// =============================================================================
// Rate Limiter: per-client sliding window with bounded backoff
// =============================================================================
//
// Each client key owns an ordered list of admission instants inside the
// current window plus a retry counter. A request over the limit either waits
// out an exponential backoff and is re-checked once, or (once the retry
// budget is spent) is rejected immediately.
//
// States per key:
//   Idle      : window empty, retry counter reset to zero.
//   Limited   : window full.
//   Backoff   : caller suspended; the map lock is NOT held while sleeping.
//   Exhausted : retry budget spent; rejections are immediate until the
//               window drains.
//
// A retry budget of zero gives plain reject-only limiting.
//
// Client keys embed the caller's API key, so logs only ever carry a short
// SHA-256 fingerprint of the key.
// =============================================================================

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::types::Clock;

// =============================================================================
// Policy
// =============================================================================

fn default_limit() -> usize {
    3
}

fn default_window_ms() -> i64 {
    60_000
}

fn default_base_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

/// Tunables for one limiter instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Admissions allowed per window.
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Sliding window length in milliseconds.
    #[serde(default = "default_window_ms")]
    pub window_ms: i64,

    /// Backoff attempts a key may spend before rejections become immediate.
    #[serde(default)]
    pub max_retries: u32,

    /// Backoff for retry `n` is `base_backoff_ms * 2^n`, capped below.
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::reject_only()
    }
}

impl RateLimitPolicy {
    /// 3 requests per minute, no backoff.
    pub fn reject_only() -> Self {
        Self {
            limit: default_limit(),
            window_ms: default_window_ms(),
            max_retries: 0,
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }

    /// 3 requests per minute, up to 3 backoff retries (2 s, 4 s, 8 s).
    pub fn with_backoff() -> Self {
        Self {
            max_retries: 3,
            ..Self::reject_only()
        }
    }

    /// Backoff before the re-check for the given (already incremented)
    /// retry count.
    pub fn backoff_for(&self, retry_count: u32) -> Duration {
        let factor = 2_u64.checked_pow(retry_count).unwrap_or(u64::MAX);
        let ms = self
            .base_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

// =============================================================================
// Decisions
// =============================================================================

/// Quota metadata returned with every decision (`X-RateLimit-*` headers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaSnapshot {
    pub limit: usize,
    pub remaining: usize,
    /// Epoch seconds at which the oldest admission leaves the window.
    pub reset_epoch_secs: i64,
}

/// Details of a refused request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRejection {
    pub quota: QuotaSnapshot,
    /// Seconds until the oldest admission leaves the window (never negative).
    pub retry_after_secs: i64,
    pub retry_count: u32,
    /// Retry budget of the policy that produced this rejection.
    pub retry_budget: u32,
    /// `true` when the budget was already spent and no backoff was attempted.
    pub exhausted: bool,
}

impl RateLimitRejection {
    /// Human-readable hint for the response body.
    pub fn message(&self) -> String {
        if self.exhausted && self.retry_budget > 0 {
            format!(
                "Maximum retries reached. Please wait {} seconds before making another request",
                self.retry_after_secs
            )
        } else {
            format!(
                "Please wait {} seconds before making another request",
                self.retry_after_secs
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allow(QuotaSnapshot),
    Reject(RateLimitRejection),
}

// =============================================================================
// Per-key record
// =============================================================================

#[derive(Debug, Default)]
struct ClientRecord {
    /// Admission instants (epoch ms), ascending.
    timestamps: Vec<i64>,
    retry_count: u32,
    last_retry_at: Option<i64>,
}

impl ClientRecord {
    /// Drop admissions that fell out of the window. An empty window returns
    /// the key to Idle and clears its retry counter.
    fn prune(&mut self, now: i64, window_ms: i64) {
        self.timestamps.retain(|&ts| now - ts < window_ms);
        if self.timestamps.is_empty() {
            self.retry_count = 0;
        }
    }

    fn record(&mut self, now: i64) {
        let pos = self.timestamps.partition_point(|&ts| ts <= now);
        self.timestamps.insert(pos, now);
    }

    fn oldest(&self) -> Option<i64> {
        self.timestamps.first().copied()
    }

    fn quota(&self, policy: &RateLimitPolicy, now: i64) -> QuotaSnapshot {
        let reset_ms = self.oldest().map_or(now, |oldest| oldest + policy.window_ms);
        QuotaSnapshot {
            limit: policy.limit,
            remaining: policy.limit.saturating_sub(self.timestamps.len()),
            reset_epoch_secs: ceil_secs(reset_ms),
        }
    }

    fn rejection(&self, policy: &RateLimitPolicy, now: i64, exhausted: bool) -> RateLimitRejection {
        let retry_after_ms = self
            .oldest()
            .map_or(0, |oldest| policy.window_ms - (now - oldest));
        RateLimitRejection {
            quota: self.quota(policy, now),
            retry_after_secs: ceil_secs(retry_after_ms).max(0),
            retry_count: self.retry_count,
            retry_budget: policy.max_retries,
            exhausted,
        }
    }
}

fn ceil_secs(ms: i64) -> i64 {
    (ms as f64 / 1000.0).ceil() as i64
}

/// Stable, non-reversible label for a client key in logs.
fn fingerprint(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(&digest[..6])
}

// =============================================================================
// RateLimiter
// =============================================================================

/// Process-wide limiter. One record per client key, created lazily.
pub struct RateLimiter {
    policy: RateLimitPolicy,
    records: Mutex<HashMap<String, ClientRecord>>,
    clock: Clock,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy, clock: Clock) -> Self {
        Self {
            policy,
            records: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Admit or refuse one request for `key`.
    ///
    /// Pruning, counting and recording happen under one lock, so concurrent
    /// requests for the same key cannot jointly exceed the limit. The backoff
    /// sleep happens with the lock released; dropping the returned future
    /// mid-sleep leaves already-recorded admissions in place.
    pub async fn check_and_record(&self, key: &str) -> RateLimitDecision {
        let now = (self.clock)();
        let backoff = {
            let mut records = self.records.lock();
            let record = records.entry(key.to_string()).or_default();
            record.prune(now, self.policy.window_ms);

            if record.timestamps.len() < self.policy.limit {
                record.record(now);
                return RateLimitDecision::Allow(record.quota(&self.policy, now));
            }

            if record.retry_count >= self.policy.max_retries {
                let rejection = record.rejection(&self.policy, now, true);
                warn!(
                    client = %fingerprint(key),
                    retry_count = record.retry_count,
                    last_retry_at = ?record.last_retry_at,
                    retry_after = rejection.retry_after_secs,
                    "rate limit exceeded, retry budget spent"
                );
                return RateLimitDecision::Reject(rejection);
            }

            record.retry_count += 1;
            record.last_retry_at = Some(now);
            self.policy.backoff_for(record.retry_count)
        };

        debug!(
            client = %fingerprint(key),
            backoff_ms = backoff.as_millis() as u64,
            "rate limited, backing off"
        );
        tokio::time::sleep(backoff).await;

        let now = (self.clock)();
        let mut records = self.records.lock();
        let record = records.entry(key.to_string()).or_default();
        record.prune(now, self.policy.window_ms);

        if record.timestamps.len() < self.policy.limit {
            record.record(now);
            debug!(client = %fingerprint(key), "admitted after backoff");
            return RateLimitDecision::Allow(record.quota(&self.policy, now));
        }

        let rejection = record.rejection(&self.policy, now, false);
        warn!(
            client = %fingerprint(key),
            retry_count = record.retry_count,
            retry_after = rejection.retry_after_secs,
            "rate limit exceeded after backoff"
        );
        RateLimitDecision::Reject(rejection)
    }

    /// Remove records whose window has fully drained. Returns how many were
    /// dropped.
    pub fn sweep_idle(&self) -> usize {
        let now = (self.clock)();
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, record| {
            record.prune(now, self.policy.window_ms);
            !record.timestamps.is_empty()
        });
        before - records.len()
    }

    /// Number of client keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.records.lock().len()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("policy", &self.policy)
            .field("tracked_keys", &self.tracked_keys())
            .finish()
    }
}

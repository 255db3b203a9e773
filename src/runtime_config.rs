// =============================================================================
// Service Configuration: limiter, cache, fetch and provider settings
// =============================================================================
//
// Loaded once at startup from a JSON file. All fields carry serde defaults so
// a partial (or empty) file is valid; a missing file is reported to the caller
// which then falls back to `ServiceConfig::default()`.
//
// A handful of deployment-specific values may be overridden from the
// environment after loading (see `apply_env_overrides`).
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::rate_limit::RateLimitPolicy;
use crate::types::IndicatorMode;
use crate::upstream::alpha_vantage::DEFAULT_INDICATOR_URL;
use crate::upstream::listing::DEFAULT_LISTING_URL;
use crate::upstream::RetryPolicy;

pub const CONFIG_PATH_ENV: &str = "MARKET_PULSE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "market_pulse.json";

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_indicator_limit() -> RateLimitPolicy {
    RateLimitPolicy::with_backoff()
}

fn default_indicator_cache_ttl_ms() -> i64 {
    5 * 60 * 1000
}

fn default_listing_cache_ttl_ms() -> i64 {
    60 * 60 * 1000
}

fn default_listing_url() -> String {
    DEFAULT_LISTING_URL.to_string()
}

fn default_indicator_url() -> String {
    DEFAULT_INDICATOR_URL.to_string()
}

fn default_api_key() -> String {
    "demo".to_string()
}

fn default_indicator_period() -> usize {
    14
}

fn default_upstream_timeout_secs() -> u64 {
    10
}

fn default_sweep_interval_secs() -> u64 {
    60
}

// =============================================================================
// ServiceConfig
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    // --- Server --------------------------------------------------------------

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    // --- Rate limiting -------------------------------------------------------

    /// Listing endpoint: reject-only by default.
    #[serde(default)]
    pub snapshot_limit: RateLimitPolicy,

    /// Indicator endpoints: backoff with a retry budget by default.
    #[serde(default = "default_indicator_limit")]
    pub indicator_limit: RateLimitPolicy,

    // --- Caching -------------------------------------------------------------

    #[serde(default = "default_indicator_cache_ttl_ms")]
    pub indicator_cache_ttl_ms: i64,

    #[serde(default = "default_listing_cache_ttl_ms")]
    pub listing_cache_ttl_ms: i64,

    // --- Upstream ------------------------------------------------------------

    #[serde(default)]
    pub fetch_retry: RetryPolicy,

    #[serde(default = "default_listing_url")]
    pub listing_url: String,

    #[serde(default = "default_indicator_url")]
    pub indicator_url: String,

    /// Never logged; see the `Debug` impl of the indicator client.
    #[serde(default = "default_api_key", skip_serializing)]
    pub indicator_api_key: String,

    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,

    // --- Indicators ----------------------------------------------------------

    /// Look-back period for SMA, EMA and RSI.
    #[serde(default = "default_indicator_period")]
    pub indicator_period: usize,

    /// Formula set used by the computed endpoint when no `mode` is given.
    #[serde(default)]
    pub indicator_mode: IndicatorMode,

    // --- Housekeeping --------------------------------------------------------

    /// How often idle limiter keys and stale cache entries are swept.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            snapshot_limit: RateLimitPolicy::reject_only(),
            indicator_limit: default_indicator_limit(),
            indicator_cache_ttl_ms: default_indicator_cache_ttl_ms(),
            listing_cache_ttl_ms: default_listing_cache_ttl_ms(),
            fetch_retry: RetryPolicy::default(),
            listing_url: default_listing_url(),
            indicator_url: default_indicator_url(),
            indicator_api_key: default_api_key(),
            upstream_timeout_secs: default_upstream_timeout_secs(),
            indicator_period: default_indicator_period(),
            indicator_mode: IndicatorMode::default(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read service config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse service config from {}", path.display()))?;

        info!(
            path = %path.display(),
            bind_addr = %config.bind_addr,
            indicator_mode = %config.indicator_mode,
            "service config loaded"
        );

        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(addr) = non_empty("MARKET_PULSE_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(key) = non_empty("ALPHA_VANTAGE_API_KEY") {
            self.indicator_api_key = key;
        }
        if let Some(url) = non_empty("MARKET_PULSE_LISTING_URL") {
            self.listing_url = url;
        }
        if let Some(url) = non_empty("MARKET_PULSE_INDICATOR_URL") {
            self.indicator_url = url;
        }
    }
}

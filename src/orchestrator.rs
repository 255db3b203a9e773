// =============================================================================
// Request Orchestrator: limiter, cache, fetch and compute for one request
// =============================================================================
//
// Pipeline per inbound request:
//
//   validate -> RateLimiter -> ResponseCache -> UpstreamFetcher -> engine
//            -> ResponseCache::put -> response
//
// Each stage may short-circuit: bad input is a 400, a limiter rejection a
// 429, a cache hit returns immediately. Indicator signals degrade one by one
// and never fail the request; only the listing path surfaces upstream
// failure as a 500.
// =============================================================================

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::cache::ResponseCache;
use crate::error::ApiError;
use crate::indicators::compute_set;
use crate::insights::{generate_insights, Insights};
use crate::rate_limit::{QuotaSnapshot, RateLimitDecision, RateLimiter};
use crate::runtime_config::ServiceConfig;
use crate::types::{Clock, IndicatorMode, IndicatorSet, MacdValues};
use crate::upstream::{
    AlphaVantageClient, CoinMarket, FetchResult, JsonTransport, ListingClient, Signal,
    UpstreamFetcher,
};

const MAX_PAGE: i64 = 10;
const DEFAULT_PAGE: i64 = 1;
const MAX_PER_PAGE: i64 = 100;
const DEFAULT_PER_PAGE: i64 = 10;
/// The listing provider exposes at most this many instruments.
const LISTABLE_INSTRUMENTS: u32 = 100;

const MIN_SYMBOL_LEN: usize = 2;
const MAX_SYMBOL_LEN: usize = 10;

// =============================================================================
// Response bodies
// =============================================================================

/// A response body together with the limiter quota that admitted it.
#[derive(Debug, Clone)]
pub struct Served<T> {
    pub body: T,
    pub quota: QuotaSnapshot,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketRow {
    pub name: String,
    pub symbol: String,
    pub price: Option<f64>,
    pub price_change_24h: Option<f64>,
    pub volume_24h: Option<f64>,
    pub market_cap: Option<f64>,
    pub last_updated: String,
    pub insights: Insights,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub per_page: u32,
    pub total_pages: u32,
    pub total_items: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketSnapshot {
    pub data: Vec<MarketRow>,
    pub pagination: Pagination,
}

/// Store sizes reported by the health endpoint.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StoreStats {
    pub snapshot_clients: usize,
    pub indicator_clients: usize,
    pub indicator_cache_entries: usize,
    pub listing_cache_entries: usize,
}

/// What one housekeeping pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub idle_clients: usize,
    pub stale_entries: usize,
}

// =============================================================================
// Orchestrator
// =============================================================================

pub struct RequestOrchestrator {
    snapshot_limiter: RateLimiter,
    indicator_limiter: RateLimiter,
    indicator_cache: ResponseCache<IndicatorSet>,
    listing_cache: ResponseCache<Vec<CoinMarket>>,
    fetcher: UpstreamFetcher,
    listing: ListingClient,
    provider: AlphaVantageClient,
    indicator_period: usize,
    default_mode: IndicatorMode,
    clock: Clock,
}

impl RequestOrchestrator {
    pub fn new(config: &ServiceConfig, transport: Arc<dyn JsonTransport>, clock: Clock) -> Self {
        Self {
            snapshot_limiter: RateLimiter::new(config.snapshot_limit.clone(), clock.clone()),
            indicator_limiter: RateLimiter::new(config.indicator_limit.clone(), clock.clone()),
            indicator_cache: ResponseCache::new(config.indicator_cache_ttl_ms),
            listing_cache: ResponseCache::new(config.listing_cache_ttl_ms),
            fetcher: UpstreamFetcher::new(config.fetch_retry.clone()),
            listing: ListingClient::new(transport.clone(), config.listing_url.clone()),
            provider: AlphaVantageClient::new(
                transport,
                config.indicator_url.clone(),
                config.indicator_api_key.clone(),
                config.indicator_period,
            ),
            indicator_period: config.indicator_period,
            default_mode: config.indicator_mode,
            clock,
        }
    }

    // -------------------------------------------------------------------------
    // Market snapshot
    // -------------------------------------------------------------------------

    /// One page of the listing with insight scores. `page` and `per_page`
    /// are the raw query values; anything unusable falls back to defaults.
    #[instrument(skip(self, client_key))]
    pub async fn market_snapshot(
        &self,
        client_key: &str,
        page: Option<&str>,
        per_page: Option<&str>,
    ) -> Result<Served<MarketSnapshot>, ApiError> {
        let quota = admit(&self.snapshot_limiter, client_key).await?;

        let page = clamp_page(page);
        let per_page = clamp_per_page(per_page);
        let coins = self.listing_page(page, per_page).await?;

        let last_updated = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let data = coins
            .iter()
            .map(|coin| MarketRow {
                name: coin.name.clone(),
                symbol: coin.symbol.clone(),
                price: coin.current_price,
                price_change_24h: coin.price_change_percentage_24h,
                volume_24h: coin.total_volume,
                market_cap: coin.market_cap,
                last_updated: last_updated.clone(),
                insights: generate_insights(coin),
            })
            .collect();

        Ok(Served {
            body: MarketSnapshot {
                data,
                pagination: Pagination {
                    current_page: page,
                    per_page,
                    total_pages: LISTABLE_INSTRUMENTS.div_ceil(per_page),
                    total_items: LISTABLE_INSTRUMENTS,
                },
            },
            quota,
        })
    }

    async fn listing_page(&self, page: u32, per_page: u32) -> Result<Vec<CoinMarket>, ApiError> {
        let cache_key = format!("markets:{page}:{per_page}");
        if let Some(coins) = self.listing_cache.get(&cache_key, (self.clock)()) {
            return Ok(coins);
        }

        let resource = format!("listing page {page}x{per_page}");
        match self
            .fetcher
            .fetch(&resource, || self.listing.fetch_markets(page, per_page))
            .await
        {
            FetchResult::Success(coins) => {
                self.listing_cache
                    .put(cache_key, coins.clone(), (self.clock)());
                Ok(coins)
            }
            FetchResult::Failure { reason, attempts } => Err(ApiError::Upstream(format!(
                "{resource} failed after {attempts} attempts: {reason}"
            ))),
        }
    }

    // -------------------------------------------------------------------------
    // Provider-computed indicators
    // -------------------------------------------------------------------------

    /// Latest SMA, EMA, RSI and MACD for `symbol` as reported by the
    /// indicator provider.
    #[instrument(skip(self, client_key))]
    pub async fn indicators(
        &self,
        client_key: &str,
        symbol: &str,
    ) -> Result<Served<IndicatorSet>, ApiError> {
        validate_symbol(symbol)?;
        let quota = admit(&self.indicator_limiter, client_key).await?;

        let cache_key = format!("indicators:{symbol}");
        if let Some(cached) = self.indicator_cache.get(&cache_key, (self.clock)()) {
            return Ok(Served { body: cached, quota });
        }

        let set = self.fetch_provider_set(symbol).await;
        if set.error.is_some() {
            info!(symbol, "no indicator could be fetched");
        }
        self.indicator_cache.put(cache_key, set.clone(), (self.clock)());
        Ok(Served { body: set, quota })
    }

    async fn fetch_provider_set(&self, symbol: &str) -> IndicatorSet {
        let scalar_signals = [Signal::Sma, Signal::Ema, Signal::Rsi];
        let scalars = join_all(scalar_signals.into_iter().map(move |signal| async move {
            let resource = format!("{signal} {symbol}");
            self.fetcher
                .fetch(&resource, || self.provider.fetch_scalar(symbol, signal))
                .await
                .ok()
        }));
        let macd = async {
            let resource = format!("MACD {symbol}");
            self.fetcher
                .fetch(&resource, || self.provider.fetch_macd(symbol))
                .await
                .ok()
                .unwrap_or_default()
        };

        let (scalars, macd): (Vec<Option<f64>>, MacdValues) = tokio::join!(scalars, macd);
        IndicatorSet {
            sma: scalars[0],
            ema: scalars[1],
            rsi: scalars[2],
            macd,
            error: None,
        }
        .mark_if_empty()
    }

    // -------------------------------------------------------------------------
    // Locally computed indicators
    // -------------------------------------------------------------------------

    /// Indicators computed here from the provider's daily closes. `mode`
    /// defaults to the configured formula set.
    #[instrument(skip(self, client_key))]
    pub async fn computed_indicators(
        &self,
        client_key: &str,
        symbol: &str,
        mode: Option<&str>,
    ) -> Result<Served<IndicatorSet>, ApiError> {
        validate_symbol(symbol)?;
        let mode = match mode {
            Some(raw) => raw.parse::<IndicatorMode>().map_err(ApiError::Validation)?,
            None => self.default_mode,
        };
        let quota = admit(&self.indicator_limiter, client_key).await?;

        let cache_key = format!("computed:{mode}:{symbol}");
        if let Some(cached) = self.indicator_cache.get(&cache_key, (self.clock)()) {
            return Ok(Served { body: cached, quota });
        }

        let resource = format!("daily closes {symbol}");
        let set = match self
            .fetcher
            .fetch(&resource, || self.provider.fetch_daily_closes(symbol))
            .await
        {
            FetchResult::Success(series) => {
                debug!(symbol, points = series.len(), %mode, "computing indicators");
                let period = self.indicator_period;
                run_blocking("indicator computation", move || {
                    compute_set(&series, period, mode)
                })
                .await?
            }
            FetchResult::Failure { .. } => IndicatorSet::default().mark_if_empty(),
        };

        self.indicator_cache.put(cache_key, set.clone(), (self.clock)());
        Ok(Served { body: set, quota })
    }

    // -------------------------------------------------------------------------
    // Housekeeping
    // -------------------------------------------------------------------------

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            snapshot_clients: self.snapshot_limiter.tracked_keys(),
            indicator_clients: self.indicator_limiter.tracked_keys(),
            indicator_cache_entries: self.indicator_cache.len(),
            listing_cache_entries: self.listing_cache.len(),
        }
    }

    /// Drop drained limiter records and expired cache entries.
    pub fn sweep(&self) -> SweepReport {
        let now = (self.clock)();
        SweepReport {
            idle_clients: self.snapshot_limiter.sweep_idle() + self.indicator_limiter.sweep_idle(),
            stale_entries: self.indicator_cache.purge_expired(now)
                + self.listing_cache.purge_expired(now),
        }
    }
}

impl std::fmt::Debug for RequestOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestOrchestrator")
            .field("stats", &self.stats())
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn admit(limiter: &RateLimiter, client_key: &str) -> Result<QuotaSnapshot, ApiError> {
    match limiter.check_and_record(client_key).await {
        RateLimitDecision::Allow(quota) => Ok(quota),
        RateLimitDecision::Reject(rejection) => Err(ApiError::RateLimited(rejection)),
    }
}

/// Run CPU-bound work off the async workers. A panicked task surfaces as an
/// internal error.
async fn run_blocking<T, F>(label: &str, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let value = tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| anyhow::anyhow!("{label} task failed: {e}"))?;
    Ok(value)
}

fn validate_symbol(symbol: &str) -> Result<(), ApiError> {
    let len = symbol.chars().count();
    if (MIN_SYMBOL_LEN..=MAX_SYMBOL_LEN).contains(&len) {
        Ok(())
    } else {
        Err(ApiError::Validation("Invalid symbol format".to_string()))
    }
}

/// Integer prefix of `raw` after optional whitespace and sign, the way
/// browsers parse loosely typed query values ("12abc" is 12, "abc" is none).
fn leading_int(raw: Option<&str>) -> Option<i64> {
    let s = raw?.trim_start();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    // Only overflow can fail here; very large values saturate.
    let magnitude = digits[..end].parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -magnitude } else { magnitude })
}

fn clamp_page(raw: Option<&str>) -> u32 {
    match leading_int(raw) {
        Some(n) if n >= 1 => n.min(MAX_PAGE) as u32,
        _ => DEFAULT_PAGE as u32,
    }
}

fn clamp_per_page(raw: Option<&str>) -> u32 {
    match leading_int(raw) {
        Some(n) if n >= 1 => n.min(MAX_PER_PAGE) as u32,
        _ => DEFAULT_PER_PAGE as u32,
    }
}

// =============================================================================
// Market listing provider: top instruments by market cap
// =============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::transport::JsonTransport;

pub const DEFAULT_LISTING_URL: &str = "https://api.coingecko.com/api/v3";

/// One row of the upstream `/coins/markets` listing. Numeric fields may be
/// null for thinly traded coins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinMarket {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub price_change_percentage_24h: Option<f64>,
    #[serde(default)]
    pub total_volume: Option<f64>,
    #[serde(default)]
    pub market_cap: Option<f64>,
}

/// Client for the listing endpoint.
#[derive(Clone)]
pub struct ListingClient {
    transport: Arc<dyn JsonTransport>,
    base_url: String,
}

impl ListingClient {
    pub fn new(transport: Arc<dyn JsonTransport>, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Fetch one page of USD markets ordered by market cap, descending.
    #[instrument(skip(self), name = "listing::fetch_markets")]
    pub async fn fetch_markets(&self, page: u32, per_page: u32) -> Result<Vec<CoinMarket>> {
        let url = format!("{}/coins/markets", self.base_url);
        let query = vec![
            ("vs_currency".to_string(), "usd".to_string()),
            ("order".to_string(), "market_cap_desc".to_string()),
            ("per_page".to_string(), per_page.to_string()),
            ("page".to_string(), page.to_string()),
            ("sparkline".to_string(), "false".to_string()),
        ];

        let body = self.transport.get_json(&url, &query).await?;
        let coins: Vec<CoinMarket> =
            serde_json::from_value(body).context("listing response is not an array of markets")?;

        debug!(count = coins.len(), "listing page fetched");
        Ok(coins)
    }
}

// =============================================================================
// Indicator provider: vendor-computed indicators and daily closes
// =============================================================================
//
// Every call goes through `query`, which turns the vendor's soft failures
// (a 200 body carrying "Note", "Information" or "Error Message") into errors
// so the retrying fetcher treats them like transport failures.
// =============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::transport::JsonTransport;
use crate::indicators::PriceSeries;
use crate::types::MacdValues;

pub const DEFAULT_INDICATOR_URL: &str = "https://www.alphavantage.co/query";

const SOFT_FAILURE_KEYS: [&str; 3] = ["Note", "Information", "Error Message"];
const DAILY_SERIES_KEY: &str = "Time Series (Daily)";
const DAILY_CLOSE_FIELD: &str = "4. close";

/// Indicators the vendor computes for us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Sma,
    Ema,
    Rsi,
    Macd,
}

impl Signal {
    pub fn function(self) -> &'static str {
        match self {
            Self::Sma => "SMA",
            Self::Ema => "EMA",
            Self::Rsi => "RSI",
            Self::Macd => "MACD",
        }
    }

    fn series_key(self) -> String {
        format!("Technical Analysis: {}", self.function())
    }

    /// MACD runs on fixed 12/26/9 periods vendor-side.
    fn takes_time_period(self) -> bool {
        !matches!(self, Self::Macd)
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.function())
    }
}

#[derive(Clone)]
pub struct AlphaVantageClient {
    transport: Arc<dyn JsonTransport>,
    base_url: String,
    api_key: String,
    time_period: usize,
}

impl AlphaVantageClient {
    pub fn new(
        transport: Arc<dyn JsonTransport>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        time_period: usize,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            api_key: api_key.into(),
            time_period,
        }
    }

    // -------------------------------------------------------------------------
    // Public calls
    // -------------------------------------------------------------------------

    /// Latest value of a single-valued indicator (SMA, EMA or RSI).
    #[instrument(skip(self), name = "alpha_vantage::fetch_scalar")]
    pub async fn fetch_scalar(&self, symbol: &str, signal: Signal) -> Result<f64> {
        let entry = self.latest_entry(symbol, signal).await?;
        let value = field_as_f64(&entry, signal.function())
            .with_context(|| format!("{signal} entry has no numeric '{signal}' field"))?;
        debug!(%signal, value, "indicator fetched");
        Ok(value)
    }

    /// Latest MACD triple. Components that are missing, unparsable or exactly
    /// zero come back as `None`.
    #[instrument(skip(self), name = "alpha_vantage::fetch_macd")]
    pub async fn fetch_macd(&self, symbol: &str) -> Result<MacdValues> {
        let entry = self.latest_entry(symbol, Signal::Macd).await?;
        let nonzero = |field: &str| field_as_f64(&entry, field).filter(|v| *v != 0.0);
        Ok(MacdValues {
            macd: nonzero("MACD"),
            signal: nonzero("MACD_Signal"),
            histogram: nonzero("MACD_Hist"),
        })
    }

    /// Daily closing prices, oldest first.
    #[instrument(skip(self), name = "alpha_vantage::fetch_daily_closes")]
    pub async fn fetch_daily_closes(&self, symbol: &str) -> Result<PriceSeries> {
        let body = self
            .query(
                "TIME_SERIES_DAILY",
                symbol,
                vec![("outputsize".to_string(), "compact".to_string())],
            )
            .await?;

        let series = body
            .get(DAILY_SERIES_KEY)
            .and_then(Value::as_object)
            .with_context(|| format!("response missing '{DAILY_SERIES_KEY}'"))?;

        let mut dated: Vec<(&String, f64)> = series
            .iter()
            .filter_map(|(date, bar)| {
                bar.as_object()
                    .and_then(|bar| field_as_f64(bar, DAILY_CLOSE_FIELD))
                    .map(|close| (date, close))
            })
            .collect();
        dated.sort_by(|a, b| a.0.cmp(b.0));

        let closes: Vec<f64> = dated.into_iter().map(|(_, close)| close).collect();
        debug!(points = closes.len(), "daily closes fetched");
        PriceSeries::new(closes).context("daily series contains no usable closes")
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    async fn latest_entry(&self, symbol: &str, signal: Signal) -> Result<Map<String, Value>> {
        let mut extra = vec![
            ("interval".to_string(), "daily".to_string()),
            ("series_type".to_string(), "close".to_string()),
        ];
        if signal.takes_time_period() {
            extra.push(("time_period".to_string(), self.time_period.to_string()));
        }

        let body = self.query(signal.function(), symbol, extra).await?;
        let key = signal.series_key();
        let series = body
            .get(&key)
            .and_then(Value::as_object)
            .with_context(|| format!("response missing '{key}'"))?;

        // Dates sort lexicographically; the newest entry has the largest key.
        series
            .iter()
            .max_by(|a, b| a.0.cmp(b.0))
            .and_then(|(_, entry)| entry.as_object().cloned())
            .with_context(|| format!("'{key}' has no entries"))
    }

    async fn query(
        &self,
        function: &str,
        symbol: &str,
        extra: Vec<(String, String)>,
    ) -> Result<Value> {
        let mut params = vec![
            ("function".to_string(), function.to_string()),
            ("symbol".to_string(), symbol.to_string()),
        ];
        params.extend(extra);
        params.push(("apikey".to_string(), self.api_key.clone()));

        let body = self.transport.get_json(&self.base_url, &params).await?;
        if let Some(notice) = soft_failure(&body) {
            anyhow::bail!("{function} request rejected by provider: {notice}");
        }
        Ok(body)
    }
}

impl std::fmt::Debug for AlphaVantageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // api_key stays out of logs.
        f.debug_struct("AlphaVantageClient")
            .field("base_url", &self.base_url)
            .field("time_period", &self.time_period)
            .finish_non_exhaustive()
    }
}

fn soft_failure(body: &Value) -> Option<String> {
    SOFT_FAILURE_KEYS.iter().find_map(|key| {
        body.get(*key).map(|v| match v.as_str() {
            Some(s) => s.to_string(),
            None => v.to_string(),
        })
    })
}

/// The vendor sends numbers as strings; accept either form.
fn field_as_f64(entry: &Map<String, Value>, field: &str) -> Option<f64> {
    let value = match entry.get(field)? {
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    value.is_finite().then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::transport::testing::ScriptedTransport;
    use serde_json::json;

    fn client(transport: ScriptedTransport) -> (Arc<ScriptedTransport>, AlphaVantageClient) {
        let transport = Arc::new(transport);
        let client = AlphaVantageClient::new(transport.clone(), "http://av.test/query", "demo", 14);
        (transport, client)
    }

    #[tokio::test]
    async fn scalar_takes_most_recent_date() {
        let (_, av) = client(ScriptedTransport::new().ok(
            "SMA",
            json!({
                "Meta Data": { "1: Symbol": "BTCUSD" },
                "Technical Analysis: SMA": {
                    "2024-01-14": { "SMA": "41000.5" },
                    "2024-01-15": { "SMA": "42000.25" },
                    "2024-01-13": { "SMA": "40000.0" }
                }
            }),
        ));
        assert_eq!(av.fetch_scalar("BTCUSD", Signal::Sma).await.unwrap(), 42000.25);
    }

    #[tokio::test]
    async fn note_in_body_is_a_failure() {
        let (_, av) = client(ScriptedTransport::new().ok(
            "RSI",
            json!({ "Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute." }),
        ));
        let err = av.fetch_scalar("BTCUSD", Signal::Rsi).await.unwrap_err();
        assert!(format!("{err:#}").contains("call frequency"));
    }

    #[tokio::test]
    async fn missing_series_is_a_failure() {
        let (_, av) = client(ScriptedTransport::new().ok("EMA", json!({ "Meta Data": {} })));
        assert!(av.fetch_scalar("BTCUSD", Signal::Ema).await.is_err());
    }

    #[tokio::test]
    async fn macd_zero_components_become_unavailable() {
        let (_, av) = client(ScriptedTransport::new().ok(
            "MACD",
            json!({
                "Technical Analysis: MACD": {
                    "2024-01-15": { "MACD": "12.5", "MACD_Signal": "0.0000", "MACD_Hist": "oops" }
                }
            }),
        ));
        let macd = av.fetch_macd("BTCUSD").await.unwrap();
        assert_eq!(macd.macd, Some(12.5));
        assert_eq!(macd.signal, None);
        assert_eq!(macd.histogram, None);
    }

    #[tokio::test]
    async fn daily_closes_are_oldest_first() {
        let (transport, av) = client(ScriptedTransport::new().ok(
            "TIME_SERIES_DAILY",
            json!({
                "Time Series (Daily)": {
                    "2024-01-03": { "4. close": "3.0" },
                    "2024-01-01": { "4. close": "1.0" },
                    "2024-01-02": { "4. close": "2.0" }
                }
            }),
        ));
        let series = av.fetch_daily_closes("IBM").await.unwrap();
        assert_eq!(series.as_slice(), &[1.0, 2.0, 3.0]);
        assert_eq!(transport.calls("TIME_SERIES_DAILY"), 1);
    }

    #[tokio::test]
    async fn empty_daily_series_is_a_failure() {
        let (_, av) = client(
            ScriptedTransport::new().ok("TIME_SERIES_DAILY", json!({ "Time Series (Daily)": {} })),
        );
        assert!(av.fetch_daily_closes("IBM").await.is_err());
    }
}

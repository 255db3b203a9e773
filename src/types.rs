// =============================================================================
// Shared types used across the Market Pulse service
// =============================================================================

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Source of "now" in UNIX epoch milliseconds. Injected so tests can drive
/// the limiter and caches with virtual time.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Current wall-clock time as UNIX epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub fn system_clock() -> Clock {
    Arc::new(now_ms)
}

/// MACD line, signal line and histogram. Any component may be unavailable.
///
/// The `MACD` key is upper-case on the wire; dashboards read it that way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MacdValues {
    #[serde(rename = "MACD")]
    pub macd: Option<f64>,
    pub signal: Option<f64>,
    pub histogram: Option<f64>,
}

impl MacdValues {
    pub fn is_unavailable(&self) -> bool {
        self.macd.is_none() && self.signal.is_none() && self.histogram.is_none()
    }
}

/// Indicator payload served to the presentation layer.
///
/// Fields degrade one by one; `error` is only set when every field failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSet {
    pub sma: Option<f64>,
    pub ema: Option<f64>,
    pub rsi: Option<f64>,
    pub macd: MacdValues,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IndicatorSet {
    /// Message attached when no indicator could be produced.
    pub const ALL_UNAVAILABLE: &'static str = "Unable to fetch indicators for this symbol";

    /// `true` when SMA, EMA, RSI and the MACD line are all unavailable.
    /// Stray signal or histogram values do not count as a usable MACD.
    pub fn all_unavailable(&self) -> bool {
        self.sma.is_none() && self.ema.is_none() && self.rsi.is_none() && self.macd.macd.is_none()
    }

    /// Set the `error` marker iff every field is unavailable.
    pub fn mark_if_empty(mut self) -> Self {
        if self.all_unavailable() {
            self.error = Some(Self::ALL_UNAVAILABLE.to_string());
        }
        self
    }
}

/// Which indicator formulas to apply to a locally fetched price series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorMode {
    /// First-price-seeded EMA, single-window RSI, one-value signal line.
    Compatible,
    /// SMA-seeded EMA, Wilder RSI, 9-period EMA signal line.
    Standard,
}

impl Default for IndicatorMode {
    fn default() -> Self {
        Self::Compatible
    }
}

impl std::fmt::Display for IndicatorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Compatible => write!(f, "compatible"),
            Self::Standard => write!(f, "standard"),
        }
    }
}

impl std::str::FromStr for IndicatorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "compatible" | "compat" => Ok(Self::Compatible),
            "standard" => Ok(Self::Standard),
            other => Err(format!(
                "Invalid indicator mode: '{other}'. Use 'compatible' or 'standard'."
            )),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macd_key_is_uppercase_on_the_wire() {
        let set = IndicatorSet {
            sma: Some(1.5),
            ..Default::default()
        };
        let json = serde_json::to_value(&set).unwrap();
        assert!(json["macd"].get("MACD").is_some());
        assert!(json["macd"]["MACD"].is_null());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn error_marker_only_when_everything_failed() {
        let partial = IndicatorSet {
            rsi: Some(55.0),
            ..Default::default()
        }
        .mark_if_empty();
        assert!(partial.error.is_none());

        let empty = IndicatorSet::default().mark_if_empty();
        assert_eq!(empty.error.as_deref(), Some(IndicatorSet::ALL_UNAVAILABLE));
    }

    #[test]
    fn macd_line_missing_counts_as_unavailable_even_with_signal() {
        let set = IndicatorSet {
            macd: MacdValues {
                macd: None,
                signal: Some(0.8),
                histogram: None,
            },
            ..Default::default()
        }
        .mark_if_empty();
        assert_eq!(set.error.as_deref(), Some(IndicatorSet::ALL_UNAVAILABLE));
    }

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("Standard".parse::<IndicatorMode>(), Ok(IndicatorMode::Standard));
        assert_eq!("compat".parse::<IndicatorMode>(), Ok(IndicatorMode::Compatible));
        assert!("fancy".parse::<IndicatorMode>().is_err());
    }
}

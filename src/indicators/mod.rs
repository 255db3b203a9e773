// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free indicator functions over an ordered close series.
// Every public function returns `Option<T>` (or a struct of options): an
// unavailable value is a normal result, never an error.

pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;

use crate::types::{IndicatorMode, IndicatorSet, MacdValues};

/// Chronological series of closing prices. Never empty, every value finite.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries(Vec<f64>);

impl PriceSeries {
    /// Wrap `closes` (oldest first). Returns `None` for an empty series or
    /// one containing a non-finite price.
    pub fn new(closes: Vec<f64>) -> Option<Self> {
        if closes.is_empty() || closes.iter().any(|c| !c.is_finite()) {
            return None;
        }
        Some(Self(closes))
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// SMA, EMA and RSI over `period`, plus MACD(12, 26, 9), using the formulas
/// selected by `mode`. The error marker is set if nothing could be computed.
pub fn compute_set(series: &PriceSeries, period: usize, mode: IndicatorMode) -> IndicatorSet {
    let closes = series.as_slice();
    let (ema, rsi, macd): (Option<f64>, Option<f64>, MacdValues) = match mode {
        IndicatorMode::Compatible => (
            ema::ema_first_price_seeded(closes, period),
            rsi::rsi_single_window(closes, period),
            macd::macd_compatible(closes),
        ),
        IndicatorMode::Standard => (
            ema::standard_ema(closes, period),
            rsi::wilder_rsi(closes, period),
            macd::macd_standard(closes),
        ),
    };

    IndicatorSet {
        sma: sma::calculate_sma(closes, period),
        ema,
        rsi,
        macd,
        error: None,
    }
    .mark_if_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(n: usize) -> PriceSeries {
        PriceSeries::new((0..n).map(|i| 40_000.0 + 500.0 * i as f64).collect()).unwrap()
    }

    #[test]
    fn price_series_rejects_empty_and_non_finite() {
        assert!(PriceSeries::new(vec![]).is_none());
        assert!(PriceSeries::new(vec![1.0, f64::NAN]).is_none());
        assert!(PriceSeries::new(vec![1.0, f64::INFINITY]).is_none());
        assert_eq!(PriceSeries::new(vec![1.0]).unwrap().len(), 1);
    }

    #[test]
    fn short_series_leaves_period_indicators_unavailable() {
        for mode in [IndicatorMode::Compatible, IndicatorMode::Standard] {
            let set = compute_set(&series(5), 14, mode);
            assert!(set.sma.is_none());
            assert!(set.ema.is_none());
            assert!(set.rsi.is_none());
            assert!(set.macd.is_unavailable());
            assert!(set.error.is_some());
        }
    }

    #[test]
    fn fourteen_closes_fill_period_indicators_but_not_macd() {
        let set = compute_set(&series(14), 14, IndicatorMode::Compatible);
        let sma = set.sma.unwrap();
        assert!((sma - (40_000.0 + 500.0 * 6.5)).abs() < 1e-6);
        assert!(set.ema.is_some());
        assert_eq!(set.rsi, Some(100.0));
        assert!(set.macd.is_unavailable());
        assert!(set.error.is_none());
    }

    #[test]
    fn long_series_fills_everything_in_both_modes() {
        for mode in [IndicatorMode::Compatible, IndicatorMode::Standard] {
            let set = compute_set(&series(60), 14, mode);
            assert!(set.sma.is_some() && set.ema.is_some() && set.rsi.is_some());
            assert!(set.macd.macd.is_some());
            assert!(set.macd.signal.is_some());
        }
    }
}

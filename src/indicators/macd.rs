// =============================================================================
// Moving Average Convergence Divergence (MACD)
// =============================================================================
//
//   MACD line = EMA(12) - EMA(26)
//   signal    = EMA(9) of the MACD line
//   histogram = MACD line - signal
//
// The compatible variant takes the signal as the EMA of a one-element series
// holding the latest MACD value, which is that value itself, so its histogram
// is always zero. The standard variant builds the full MACD line.
// =============================================================================

use super::ema::{calculate_ema, ema_first_price_seeded, first_price_recurrence, multiplier};
use crate::types::MacdValues;

pub const FAST_PERIOD: usize = 12;
pub const SLOW_PERIOD: usize = 26;
pub const SIGNAL_PERIOD: usize = 9;

/// MACD from first-price-seeded EMAs with a one-value signal line.
///
/// All three components are unavailable together when either EMA is.
pub fn macd_compatible(closes: &[f64]) -> MacdValues {
    let (Some(fast), Some(slow)) = (
        ema_first_price_seeded(closes, FAST_PERIOD),
        ema_first_price_seeded(closes, SLOW_PERIOD),
    ) else {
        return MacdValues::default();
    };

    let macd = fast - slow;
    let Some(signal) = single_value_signal(macd) else {
        return MacdValues::default();
    };

    MacdValues {
        macd: Some(macd),
        signal: Some(signal),
        histogram: Some(macd - signal),
    }
}

/// Signal line as the EMA(9) recurrence over `[macd]` alone.
fn single_value_signal(macd: f64) -> Option<f64> {
    first_price_recurrence(&[macd], multiplier(SIGNAL_PERIOD))
}

/// MACD from SMA-seeded EMAs with a 9-period EMA signal line.
///
/// The MACD line needs `SLOW_PERIOD` closes; the signal line needs
/// `SIGNAL_PERIOD` MACD points on top of that. When only the line is
/// available, `signal` and `histogram` stay `None`.
pub fn macd_standard(closes: &[f64]) -> MacdValues {
    let fast = calculate_ema(closes, FAST_PERIOD);
    let slow = calculate_ema(closes, SLOW_PERIOD);
    if fast.is_empty() || slow.is_empty() {
        return MacdValues::default();
    }

    // fast[i] is aligned to close index i + FAST_PERIOD - 1, slow[j] to
    // j + SLOW_PERIOD - 1.
    let offset = SLOW_PERIOD - FAST_PERIOD;
    let line: Vec<f64> = slow
        .iter()
        .zip(fast.iter().skip(offset))
        .map(|(s, f)| f - s)
        .collect();

    let Some(&macd) = line.last() else {
        return MacdValues::default();
    };

    let signal = calculate_ema(&line, SIGNAL_PERIOD).last().copied();
    MacdValues {
        macd: Some(macd),
        signal,
        histogram: signal.map(|s| macd - s),
    }
}

// =============================================================================
// Simple Moving Average (SMA)
// =============================================================================
//
// SMA = arithmetic mean of the last `period` closes. No partial-window
// approximation: fewer closes than `period` means no value.
// =============================================================================

/// Mean of the last `period` values of `closes`.
///
/// Returns `None` when `period == 0`, when the input is shorter than `period`,
/// or when the mean is non-finite.
pub fn calculate_sma(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let window = &closes[closes.len() - period..];
    let mean = window.iter().sum::<f64>() / period as f64;
    mean.is_finite().then_some(mean)
}

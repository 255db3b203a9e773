// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// EMA gives more weight to recent prices, making it more responsive to new
// information than the Simple Moving Average (SMA).
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_t      = close_t * multiplier + EMA_{t-1} * (1 - multiplier)
//
// Two seedings live here:
//   - `ema_first_price_seeded`: seeded with the very first close and run over
//     the whole series. This is what the dashboard has always shown, so it is
//     the compatible default even though it is not the textbook EMA.
//   - `calculate_ema`: seeded with the SMA of the first `period` closes.
// =============================================================================

/// Smoothing factor `2 / (period + 1)`.
pub(crate) fn multiplier(period: usize) -> f64 {
    2.0 / (period as f64 + 1.0)
}

/// Run the EMA recurrence over `closes`, seeding with `closes[0]`.
///
/// No length guard: a one-element series yields that element.
pub(crate) fn first_price_recurrence(closes: &[f64], multiplier: f64) -> Option<f64> {
    let (&seed, rest) = closes.split_first()?;
    let ema = rest
        .iter()
        .fold(seed, |prev, &close| close * multiplier + prev * (1.0 - multiplier));
    ema.is_finite().then_some(ema)
}

/// Latest EMA value, seeded with the first close of the series.
///
/// `period` only sets the smoothing factor and the minimum length; the
/// recurrence always spans the entire series.
///
/// # Edge cases
/// - `period == 0` => `None`
/// - `closes.len() < period` => `None`
/// - non-finite result => `None`
pub fn ema_first_price_seeded(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period {
        return None;
    }
    first_price_recurrence(closes, multiplier(period))
}

/// Compute the SMA-seeded EMA series for the given `closes` and `period`.
///
/// Returns an empty `Vec` when the input is too short or the period is zero.
/// Each output element corresponds to a close starting at index `period - 1`.
///
/// # Edge cases
/// - `period == 0` => empty vec
/// - `closes.len() < period` => empty vec
/// - A non-finite intermediate value truncates the series.
pub fn calculate_ema(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period {
        return Vec::new();
    }

    let multiplier = multiplier(period);

    // Seed: SMA of the first `period` values.
    let sma: f64 = closes[..period].iter().sum::<f64>() / period as f64;
    if !sma.is_finite() {
        return Vec::new();
    }

    let mut result = Vec::with_capacity(closes.len() - period + 1);
    result.push(sma);

    let mut prev_ema = sma;
    for &close in &closes[period..] {
        let ema = close * multiplier + prev_ema * (1.0 - multiplier);
        if !ema.is_finite() {
            break;
        }
        result.push(ema);
        prev_ema = ema;
    }

    result
}

/// Latest value of the SMA-seeded EMA.
pub fn standard_ema(closes: &[f64], period: usize) -> Option<f64> {
    calculate_ema(closes, period).last().copied()
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    // ---- ema_first_price_seeded ------------------------------------------

    #[test]
    fn first_price_seeded_known_values() {
        // k = 0.5: 1 -> 1.5 -> 2.25
        let ema = ema_first_price_seeded(&[1.0, 2.0, 3.0], 3).unwrap();
        assert!((ema - 2.25).abs() < 1e-12);
    }

    #[test]
    fn first_price_seeded_deviates_from_textbook_ema() {
        // Documented deviation: the textbook EMA seeds with the SMA of the
        // first `period` closes and would give 2.0 here, not 2.25.
        let closes = [1.0, 2.0, 3.0];
        let compat = ema_first_price_seeded(&closes, 3).unwrap();
        let textbook = standard_ema(&closes, 3).unwrap();
        assert!((textbook - 2.0).abs() < 1e-12);
        assert!((compat - textbook).abs() > 0.1);
    }

    #[test]
    fn first_price_seeded_spans_whole_series() {
        // The recurrence runs over every close, not just the last `period`.
        let closes: Vec<f64> = (1..=10).map(|x| x as f64).collect();
        let k = 2.0 / 4.0;
        let mut expected = 1.0;
        for &c in &closes[1..] {
            expected = c * k + expected * (1.0 - k);
        }
        let ema = ema_first_price_seeded(&closes, 3).unwrap();
        assert!((ema - expected).abs() < 1e-12);
    }

    #[test]
    fn first_price_seeded_insufficient_data() {
        assert!(ema_first_price_seeded(&[1.0, 2.0], 3).is_none());
        assert!(ema_first_price_seeded(&[], 1).is_none());
        assert!(ema_first_price_seeded(&[1.0], 0).is_none());
    }

    #[test]
    fn recurrence_of_single_value_is_that_value() {
        let v = first_price_recurrence(&[42.5], multiplier(9)).unwrap();
        assert!((v - 42.5).abs() < 1e-12);
    }

    // ---- calculate_ema ---------------------------------------------------

    #[test]
    fn ema_period_equals_length() {
        let ema = calculate_ema(&[2.0, 4.0, 6.0], 3);
        assert_eq!(ema.len(), 1);
        assert!((ema[0] - 4.0).abs() < 1e-10);
    }

    #[test]
    fn ema_known_values() {
        // 5-period EMA of [1..=10]: SMA seed = 3.0, multiplier = 1/3
        let closes: Vec<f64> = (1..=10).map(|x| x as f64).collect();
        let ema = calculate_ema(&closes, 5);
        assert_eq!(ema.len(), 6);

        let mult = 2.0 / 6.0;
        let mut expected = 3.0;
        let mut expected_vec = vec![expected];
        for &c in &closes[5..] {
            expected = c * mult + expected * (1.0 - mult);
            expected_vec.push(expected);
        }
        for (a, b) in ema.iter().zip(expected_vec.iter()) {
            assert!((a - b).abs() < 1e-10, "got {a}, expected {b}");
        }
    }

    #[test]
    fn ema_handles_nan_in_input() {
        let closes = vec![1.0, 2.0, 3.0, f64::NAN, 5.0];
        assert_eq!(calculate_ema(&closes, 3).len(), 1);
    }

    #[test]
    fn standard_ema_empty_when_short() {
        assert!(standard_ema(&[1.0], 2).is_none());
    }
}

// =============================================================================
// Moving Average Convergence / Divergence (MACD)
// =============================================================================
//
// MACD line = EMA(fast) - EMA(slow), both computed on the same closes.
// Signal line = EMA(signal_period) of the MACD line.
// Histogram = MACD line - signal line.
//
// The signal line needs `signal_period` MACD values to seed its own EMA;
// when history shorter than that is available the signal is approximated as
// 0.9 * macd_line (documented approximation, see SPEC_FULL.md / DESIGN.md —
// production intent for this path is an open question, not resolved here).

use super::ema::calculate_ema;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct MacdResult {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Compute the most recent MACD/signal/histogram triple.
///
/// Returns `None` when fewer than `slow + signal_period` closes are
/// available (the minimum needed for the slow EMA plus a seeded signal
/// line), mirroring the other indicators' "insufficient data" convention.
pub fn calculate_macd(
    closes: &[f64],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> Option<MacdResult> {
    if fast == 0 || slow == 0 || signal_period == 0 || fast >= slow {
        return None;
    }
    if closes.len() < slow + 1 {
        return None;
    }

    let ema_fast = calculate_ema(closes, fast);
    let ema_slow = calculate_ema(closes, slow);
    if ema_fast.is_empty() || ema_slow.is_empty() {
        return None;
    }

    // Both series are aligned to the *end* of `closes`; align on the tail so
    // each MACD point compares the fast/slow EMA at the same close index.
    let n = ema_fast.len().min(ema_slow.len());
    let fast_tail = &ema_fast[ema_fast.len() - n..];
    let slow_tail = &ema_slow[ema_slow.len() - n..];
    let macd_series: Vec<f64> = fast_tail
        .iter()
        .zip(slow_tail.iter())
        .map(|(f, s)| f - s)
        .collect();

    let macd_line = *macd_series.last()?;

    let signal = if macd_series.len() >= signal_period {
        *calculate_ema(&macd_series, signal_period).last()?
    } else {
        0.9 * macd_line
    };

    let histogram = macd_line - signal;
    if !macd_line.is_finite() || !signal.is_finite() || !histogram.is_finite() {
        return None;
    }

    Some(MacdResult {
        macd: macd_line,
        signal,
        histogram,
    })
}

/// Convenience wrapper using the canonical 12/26/9 parameters.
pub fn calculate_macd_default(closes: &[f64]) -> Option<MacdResult> {
    calculate_macd(closes, 12, 26, 9)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macd_insufficient_data() {
        let closes: Vec<f64> = (1..=20).map(|x| x as f64).collect();
        assert!(calculate_macd_default(&closes).is_none());
    }

    #[test]
    fn macd_requires_35_points() {
        let closes: Vec<f64> = (1..=35).map(|x| x as f64).collect();
        assert!(calculate_macd_default(&closes).is_some());
    }

    #[test]
    fn macd_bullish_trend_positive_histogram() {
        // A strongly rising series should show a positive MACD line (fast
        // EMA pulling above slow EMA).
        let closes: Vec<f64> = (1..=100).map(|x| x as f64).collect();
        let result = calculate_macd_default(&closes).unwrap();
        assert!(result.macd > 0.0);
    }

    #[test]
    fn macd_flat_series_is_zero() {
        let closes = vec![100.0; 100];
        let result = calculate_macd_default(&closes).unwrap();
        assert!(result.macd.abs() < 1e-9);
        assert!(result.signal.abs() < 1e-9);
        assert!(result.histogram.abs() < 1e-9);
    }

    #[test]
    fn macd_short_history_uses_approximated_signal() {
        // Between 35 and 35+9 points the signal line is seeded by the
        // approximation, not a real EMA of the MACD series.
        let closes: Vec<f64> = (1..=36).map(|x| x as f64).collect();
        let result = calculate_macd(&closes, 12, 26, 9).unwrap();
        assert!((result.signal - 0.9 * result.macd).abs() < 1e-9);
    }

    #[test]
    fn macd_invalid_periods() {
        let closes: Vec<f64> = (1..=100).map(|x| x as f64).collect();
        assert!(calculate_macd(&closes, 0, 26, 9).is_none());
        assert!(calculate_macd(&closes, 26, 12, 9).is_none());
    }
}

//! Signal features over daily close series.
//!
//! All functions take date-ascending close slices and return NaN when the
//! history is too short, so callers can skip rather than special-case.

/// Mean of the trailing `n` closes.
pub fn sma(closes: &[f64], n: usize) -> f64 {
    if closes.len() < n || n == 0 {
        return f64::NAN;
    }
    let tail = &closes[closes.len() - n..];
    tail.iter().sum::<f64>() / n as f64
}

/// Simple return over the trailing `n` sessions.
pub fn pct_change_n(closes: &[f64], n: usize) -> f64 {
    if closes.len() < n + 1 {
        return f64::NAN;
    }
    closes[closes.len() - 1] / closes[closes.len() - 1 - n] - 1.0
}

/// Annualized standard deviation of daily returns over the trailing `n`
/// sessions.
pub fn rolling_vol(closes: &[f64], n: usize) -> f64 {
    let returns: Vec<f64> = closes.windows(2).map(|w| w[1] / w[0] - 1.0).collect();
    if returns.len() < n || n < 2 {
        return f64::NAN;
    }
    let tail = &returns[returns.len() - n..];
    let mean = tail.iter().sum::<f64>() / n as f64;
    let var = tail.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n as f64 - 1.0);
    var.sqrt() * 252f64.sqrt()
}

/// Worst peak-to-trough drawdown over the trailing `lookback` sessions.
pub fn max_drawdown(closes: &[f64], lookback: usize) -> f64 {
    if closes.is_empty() {
        return f64::NAN;
    }
    let lookback = lookback.min(closes.len());
    let tail = &closes[closes.len() - lookback..];
    let mut peak = f64::MIN;
    let mut worst: f64 = 0.0;
    for &close in tail {
        peak = peak.max(close);
        worst = worst.min(close / peak - 1.0);
    }
    worst
}

/// Distance of the last close from the trailing `lookback` high.
pub fn trailing_drawdown(closes: &[f64], lookback: usize) -> f64 {
    if closes.len() < 5 {
        return f64::NAN;
    }
    let tail = if closes.len() >= lookback {
        &closes[closes.len() - lookback..]
    } else {
        closes
    };
    let peak = tail.iter().fold(f64::MIN, |a, &b| a.max(b));
    closes[closes.len() - 1] / peak - 1.0
}

/// 0.6 for price above the 200-day mean plus 0.4 for the 50-day mean above
/// the 200-day mean.
pub fn trend_score(closes: &[f64]) -> f64 {
    let s50 = sma(closes, 50);
    let s200 = sma(closes, 200);
    if s50.is_nan() || s200.is_nan() {
        return f64::NAN;
    }
    let now = closes[closes.len() - 1];
    let mut score = 0.0;
    if now > s200 {
        score += 0.6;
    }
    if s50 > s200 {
        score += 0.4;
    }
    score
}

/// Blended 3/6/12-month momentum.
pub fn momentum_score(closes: &[f64]) -> f64 {
    let r3 = pct_change_n(closes, 63);
    let r6 = pct_change_n(closes, 126);
    let r12 = pct_change_n(closes, 252);
    if r3.is_nan() || r6.is_nan() || r12.is_nan() {
        return f64::NAN;
    }
    0.5 * r3 + 0.3 * r6 + 0.2 * r12
}

/// Population z-scores with a small-denominator guard.
pub fn zscore(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    values.iter().map(|v| (v - mean) / (std + 1e-12)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_is_the_trailing_mean() {
        let closes = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(sma(&closes, 2), 4.5);
        assert_eq!(sma(&closes, 5), 3.0);
        assert!(sma(&closes, 6).is_nan());
    }

    #[test]
    fn pct_change_measures_n_sessions_back() {
        let closes = [100.0, 110.0, 121.0];
        assert!((pct_change_n(&closes, 1) - 0.1).abs() < 1e-12);
        assert!((pct_change_n(&closes, 2) - 0.21).abs() < 1e-12);
        assert!(pct_change_n(&closes, 3).is_nan());
    }

    #[test]
    fn flat_series_has_zero_vol_and_drawdown() {
        let closes = vec![100.0; 300];
        assert_eq!(rolling_vol(&closes, 63), 0.0);
        assert_eq!(max_drawdown(&closes, 252), 0.0);
        assert_eq!(trailing_drawdown(&closes, 126), 0.0);
    }

    #[test]
    fn max_drawdown_finds_the_worst_trough() {
        // peak 120, trough 90 -> -25%
        let closes = [100.0, 120.0, 95.0, 90.0, 110.0];
        assert!((max_drawdown(&closes, 10) - (-0.25)).abs() < 1e-12);
    }

    #[test]
    fn trailing_drawdown_is_from_the_window_high() {
        let closes = [100.0, 120.0, 95.0, 90.0, 108.0];
        assert!((trailing_drawdown(&closes, 10) - (108.0 / 120.0 - 1.0)).abs() < 1e-12);
        assert!(trailing_drawdown(&closes[..3], 10).is_nan());
    }

    #[test]
    fn trend_score_levels() {
        // Monotonically rising series: price > sma200 and sma50 > sma200.
        let rising: Vec<f64> = (0..250).map(|i| 100.0 + i as f64).collect();
        assert_eq!(trend_score(&rising), 1.0);

        let falling: Vec<f64> = (0..250).map(|i| 400.0 - i as f64).collect();
        assert_eq!(trend_score(&falling), 0.0);

        assert!(trend_score(&rising[..100]).is_nan());
    }

    #[test]
    fn momentum_requires_a_full_year() {
        let closes: Vec<f64> = (0..260).map(|i| 100.0 * 1.001f64.powi(i)).collect();
        let m = momentum_score(&closes);
        assert!(m > 0.0);
        assert!(momentum_score(&closes[..200]).is_nan());
    }

    #[test]
    fn zscore_centers_and_scales() {
        let z = zscore(&[1.0, 2.0, 3.0]);
        assert!((z[0] + z[1] + z[2]).abs() < 1e-9);
        assert!(z[0] < 0.0 && z[2] > 0.0);
        // constant input stays finite thanks to the guard
        let z = zscore(&[5.0, 5.0, 5.0]);
        assert!(z.iter().all(|v| v.abs() < 1e-6));
    }
}

//! Macro regime scoring.
//!
//! Blends equity trend, dollar momentum, credit spread, volatility and
//! rates components into one [0,1] risk score, then thresholds it into a
//! regime state. Components with insufficient history are skipped and the
//! remaining weights renormalized.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::RegimeConfig;
use crate::data::PriceHistory;
use crate::engine::features::{momentum_score, pct_change_n, sma};

const SPY: &str = "SPY";
const UUP: &str = "UUP";
const HYG: &str = "HYG";
const IEF: &str = "IEF";
const VIX: &str = "^VIX";
const TLT: &str = "TLT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegimeState {
    RiskOn,
    Neutral,
    RiskOff,
}

impl std::fmt::Display for RegimeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RegimeState::RiskOn => "RISK_ON",
            RegimeState::Neutral => "NEUTRAL",
            RegimeState::RiskOff => "RISK_OFF",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MacroRegime {
    pub risk_score: f64,
    pub state: RegimeState,
    /// Component values that went into the score, for reporting.
    pub details: BTreeMap<String, f64>,
    /// Volatility shock flag; execution treats it as a halt signal.
    pub vix_spike: bool,
}

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Last VIX close above 1.25x its 20-day mean.
pub fn is_vix_spike(prices: &PriceHistory) -> bool {
    let Some(vix) = prices.closes(VIX) else {
        return false;
    };
    if vix.len() < 30 {
        return false;
    }
    let current = vix[vix.len() - 1];
    let ma20 = sma(vix, 20);
    !ma20.is_nan() && current > ma20 * 1.25
}

pub fn compute_regime(prices: &PriceHistory, cfg: &RegimeConfig) -> MacroRegime {
    let mut details = BTreeMap::new();

    // Equity trend: above the 200-day mean or not.
    let spy_trend = prices
        .closes(SPY)
        .filter(|c| c.len() > 210)
        .map(|c| {
            let s200 = sma(c, 200);
            if s200.is_nan() {
                f64::NAN
            } else {
                f64::from(u8::from(c[c.len() - 1] > s200))
            }
        })
        .unwrap_or(f64::NAN);
    details.insert("spy_trend".to_string(), spy_trend);

    // Dollar strength is risk-negative.
    let usd = prices
        .closes(UUP)
        .filter(|c| c.len() > 260)
        .map(|c| {
            let m = momentum_score(c);
            if m.is_nan() {
                f64::NAN
            } else {
                clamp01(0.5 - m)
            }
        })
        .unwrap_or(f64::NAN);
    details.insert("usd_component".to_string(), usd);

    // Credit: high-yield outperforming treasuries over ~3 months.
    let credit = match (prices.closes(HYG), prices.closes(IEF)) {
        (Some(hyg), Some(ief)) if hyg.len() > 90 && ief.len() > 90 => {
            let hyg_r = pct_change_n(hyg, 63);
            let ief_r = pct_change_n(ief, 63);
            if hyg_r.is_nan() || ief_r.is_nan() {
                f64::NAN
            } else {
                clamp01(0.5 + (hyg_r - ief_r))
            }
        }
        _ => f64::NAN,
    };
    details.insert("credit_component".to_string(), credit);

    // Volatility: level plus one-month shock.
    let vix = prices
        .closes(VIX)
        .filter(|c| c.len() > 120)
        .map(|c| {
            let current = c[c.len() - 1];
            let mom1m = pct_change_n(c, 21);
            let base = clamp01(1.0 - (current - 15.0) / 20.0);
            let shock = if mom1m.is_nan() {
                0.5
            } else {
                clamp01(1.0 - mom1m.max(0.0) / 0.3)
            };
            0.6 * base + 0.4 * shock
        })
        .unwrap_or(f64::NAN);
    details.insert("vix_component".to_string(), vix);

    // Duration bid is risk-supportive.
    let rates = prices
        .closes(TLT)
        .filter(|c| c.len() > 260)
        .map(|c| {
            let m = momentum_score(c);
            if m.is_nan() {
                f64::NAN
            } else {
                clamp01(0.5 + m)
            }
        })
        .unwrap_or(f64::NAN);
    details.insert("rates_component".to_string(), rates);

    let weighted = [
        (spy_trend, cfg.weights.spy_trend),
        (usd, cfg.weights.usd_momentum),
        (credit, cfg.weights.credit),
        (vix, cfg.weights.vix),
        (rates, cfg.weights.rates),
    ];
    let usable: Vec<(f64, f64)> = weighted
        .into_iter()
        .filter(|(value, _)| !value.is_nan())
        .collect();

    let vix_spike = is_vix_spike(prices);

    if usable.is_empty() {
        details.insert("risk_score".to_string(), 0.5);
        return MacroRegime {
            risk_score: 0.5,
            state: RegimeState::Neutral,
            details,
            vix_spike,
        };
    }

    let weight_sum: f64 = usable.iter().map(|(_, w)| w).sum::<f64>() + 1e-12;
    let score: f64 = usable
        .iter()
        .map(|(value, weight)| (weight / weight_sum) * value)
        .sum();

    let state = if score >= cfg.risk_on_score_min {
        RegimeState::RiskOn
    } else if score <= cfg.risk_off_score_max {
        RegimeState::RiskOff
    } else {
        RegimeState::Neutral
    };
    details.insert("risk_score".to_string(), score);

    MacroRegime {
        risk_score: score,
        state,
        details,
        vix_spike,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PriceSeries;
    use chrono::NaiveDate;

    fn series(closes: Vec<f64>) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
        let dates = (0..closes.len())
            .map(|i| start + chrono::Duration::days(i as i64))
            .collect();
        PriceSeries::new(dates, closes)
    }

    fn rising(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 * 1.001f64.powi(i as i32)).collect()
    }

    fn falling(n: usize) -> Vec<f64> {
        (0..n).map(|i| 400.0 * 0.999f64.powi(i as i32)).collect()
    }

    #[test]
    fn bullish_inputs_score_risk_on() {
        let mut prices = PriceHistory::new();
        prices.insert(SPY, series(rising(300)));
        prices.insert(HYG, series(rising(300)));
        prices.insert(IEF, series(vec![100.0; 300]));
        prices.insert(TLT, series(rising(300)));
        prices.insert(UUP, series(falling(300)));
        prices.insert(VIX, series(vec![13.0; 300]));

        let regime = compute_regime(&prices, &RegimeConfig::default());
        assert_eq!(regime.state, RegimeState::RiskOn);
        assert!(regime.risk_score >= 0.55);
        assert!(!regime.vix_spike);
    }

    #[test]
    fn bearish_inputs_score_risk_off() {
        let mut prices = PriceHistory::new();
        prices.insert(SPY, series(falling(300)));
        prices.insert(HYG, series(falling(300)));
        prices.insert(IEF, series(rising(300)));
        prices.insert(TLT, series(falling(300)));
        prices.insert(UUP, series(rising(300)));
        prices.insert(VIX, series(vec![40.0; 300]));

        let regime = compute_regime(&prices, &RegimeConfig::default());
        assert_eq!(regime.state, RegimeState::RiskOff);
    }

    #[test]
    fn no_usable_components_is_neutral() {
        let prices = PriceHistory::new();
        let regime = compute_regime(&prices, &RegimeConfig::default());
        assert_eq!(regime.state, RegimeState::Neutral);
        assert_eq!(regime.risk_score, 0.5);
    }

    #[test]
    fn vix_spike_detection() {
        let mut closes = vec![15.0; 100];
        closes.push(30.0);
        let mut prices = PriceHistory::new();
        prices.insert(VIX, series(closes));
        assert!(is_vix_spike(&prices));

        let mut prices = PriceHistory::new();
        prices.insert(VIX, series(vec![15.0; 100]));
        assert!(!is_vix_spike(&prices));
    }
}

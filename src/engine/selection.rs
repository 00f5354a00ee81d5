//! Universe scoring, selection and weight allocation.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::{RiskCutConfig, ScoreWeights, SelectionConfig};
use crate::data::PriceHistory;
use crate::engine::features::{
    max_drawdown, momentum_score, rolling_vol, sma, trailing_drawdown, trend_score, zscore,
};
use crate::engine::regime::RegimeState;

/// Minimum history to score a ticker (roughly one trading year plus momentum
/// lookback headroom).
const MIN_HISTORY: usize = 260;

#[derive(Debug, Clone, Serialize)]
pub struct ScoreRow {
    pub ticker: String,
    pub momentum: f64,
    pub trend: f64,
    pub vol: f64,
    pub mdd_1y: f64,
    pub mom_z: f64,
    pub trend_z: f64,
    pub vol_z: f64,
    pub dd_z: f64,
    pub score: f64,
}

/// Score every ticker with enough history, descending by composite score.
pub fn score_universe(prices: &PriceHistory, weights: &ScoreWeights) -> Vec<ScoreRow> {
    let mut rows: Vec<ScoreRow> = Vec::new();
    for ticker in prices.tickers() {
        let closes = match prices.closes(ticker) {
            Some(c) if c.len() >= MIN_HISTORY => c,
            _ => continue,
        };
        let momentum = momentum_score(closes);
        if momentum.is_nan() {
            continue;
        }
        let trend = trend_score(closes);
        rows.push(ScoreRow {
            ticker: ticker.clone(),
            momentum,
            trend: if trend.is_nan() { 0.0 } else { trend },
            vol: rolling_vol(closes, 63),
            mdd_1y: max_drawdown(closes, 252),
            mom_z: 0.0,
            trend_z: 0.0,
            vol_z: 0.0,
            dd_z: 0.0,
            score: 0.0,
        });
    }
    if rows.is_empty() {
        return rows;
    }

    let mom_z = zscore(&rows.iter().map(|r| r.momentum).collect::<Vec<_>>());
    let trend_z = zscore(&rows.iter().map(|r| r.trend).collect::<Vec<_>>());
    let vol_z = zscore(&rows.iter().map(|r| r.vol).collect::<Vec<_>>());
    let dd_z = zscore(&rows.iter().map(|r| r.mdd_1y).collect::<Vec<_>>());

    for (i, row) in rows.iter_mut().enumerate() {
        row.mom_z = mom_z[i];
        row.trend_z = trend_z[i];
        row.vol_z = vol_z[i];
        row.dd_z = dd_z[i];
        row.score = weights.momentum * row.mom_z + weights.trend * row.trend_z
            - weights.vol_penalty * row.vol_z
            - weights.dd_penalty * row.dd_z;
    }
    rows.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    rows
}

/// Regime-dependent pick from the scored universe.
pub fn select(scores: &[ScoreRow], state: RegimeState, cfg: &SelectionConfig) -> Vec<ScoreRow> {
    match state {
        RegimeState::RiskOn => scores.iter().take(cfg.top_n_risk_on).cloned().collect(),
        RegimeState::RiskOff => {
            // Defensive re-rank: penalize volatility harder.
            let mut defensive: Vec<ScoreRow> = scores.to_vec();
            defensive.sort_by(|a, b| {
                let da = a.score - 0.3 * a.vol_z;
                let db = b.score - 0.3 * b.vol_z;
                db.partial_cmp(&da).unwrap_or(std::cmp::Ordering::Equal)
            });
            defensive.into_iter().take(cfg.top_n_risk_off).collect()
        }
        RegimeState::Neutral => scores
            .iter()
            .take(std::cmp::max(3, cfg.top_n_risk_on / 2))
            .cloned()
            .collect(),
    }
}

/// Inverse-volatility weights, capped per ticker and renormalized.
pub fn allocate_weights(selected: &[ScoreRow], max_weight: f64) -> BTreeMap<String, f64> {
    let inv: Vec<(String, f64)> = selected
        .iter()
        .filter(|r| r.vol.is_finite() && r.vol > 0.0)
        .map(|r| (r.ticker.clone(), 1.0 / r.vol))
        .collect();
    let total: f64 = inv.iter().map(|(_, v)| v).sum();
    if total <= 0.0 {
        return BTreeMap::new();
    }

    let mut weights: BTreeMap<String, f64> = inv
        .into_iter()
        .map(|(ticker, v)| (ticker, (v / total).min(max_weight)))
        .collect();
    let sum: f64 = weights.values().sum();
    if sum > 0.0 {
        for w in weights.values_mut() {
            *w /= sum;
        }
    }
    weights
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskCut {
    pub ticker: String,
    pub reasons: String,
    pub cut_weight: f64,
}

/// Zero out weights that violate the trend/drawdown rules, moving the cut
/// weight to the cash ticker, and renormalize.
pub fn apply_risk_cuts(
    prices: &PriceHistory,
    target_weights: &BTreeMap<String, f64>,
    cfg: &RiskCutConfig,
) -> (BTreeMap<String, f64>, Vec<RiskCut>) {
    if !cfg.enabled || target_weights.is_empty() {
        return (target_weights.clone(), Vec::new());
    }

    let mut new_weights = target_weights.clone();
    let mut cuts = Vec::new();
    let mut cash_add = 0.0;

    for (ticker, &weight) in target_weights {
        if weight <= 0.0 {
            continue;
        }
        let closes = match prices.closes(ticker) {
            Some(c) if c.len() >= 210 => c,
            _ => continue,
        };

        let mut reasons: Vec<String> = Vec::new();
        if cfg.below_200sma_cut {
            let s200 = sma(closes, 200);
            if !s200.is_nan() && closes[closes.len() - 1] < s200 {
                reasons.push("below_200sma".to_string());
            }
        }
        let dd_trail = trailing_drawdown(closes, 126);
        if !dd_trail.is_nan() && dd_trail <= cfg.trailing_dd_cut {
            reasons.push(format!("trail_dd{:.2}%", dd_trail * 100.0));
        }
        let dd_short = trailing_drawdown(closes, 63);
        if !dd_short.is_nan() && dd_short <= cfg.hard_stop_cut {
            reasons.push(format!("hard_stop{:.2}%", dd_short * 100.0));
        }

        if !reasons.is_empty() {
            cuts.push(RiskCut {
                ticker: ticker.clone(),
                reasons: reasons.join(","),
                cut_weight: weight,
            });
            cash_add += weight;
            new_weights.insert(ticker.clone(), 0.0);
        }
    }

    if cuts.is_empty() {
        return (target_weights.clone(), Vec::new());
    }

    if cfg.cut_to_cash {
        *new_weights.entry(cfg.cash_ticker.clone()).or_insert(0.0) += cash_add;
    }
    let sum: f64 = new_weights.values().sum();
    if sum > 0.0 {
        for w in new_weights.values_mut() {
            *w /= sum;
        }
    }
    (new_weights, cuts)
}

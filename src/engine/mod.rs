//! Rebalance engine orchestration.
//!
//! `run_once` is the deterministic batch half: fetch prices, score the
//! regime and the universe, allocate weights, cut risk, write the report.
//! `execute_rebalance` is the trading half: diff the final weights against
//! the live account and push the resulting intents through the broker one
//! at a time.

pub mod features;
pub mod rebalance;
pub mod regime;
pub mod selection;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::broker::Broker;
use crate::config::AppConfig;
use crate::data::{fetch_history, lookback_range, provider::PriceProvider, PriceHistory};
use crate::domain::{normalize_symbol, ExecutionReport};
use crate::error::{RebalError, Result};
use crate::notifier::TelegramNotifier;
use crate::report::{build_rows, save_report};
use regime::MacroRegime;
use selection::{allocate_weights, apply_risk_cuts, score_universe, select, RiskCut, ScoreRow};

pub struct RunSummary {
    pub regime: MacroRegime,
    pub selected: Vec<ScoreRow>,
    pub target_weights: BTreeMap<String, f64>,
    pub final_weights: BTreeMap<String, f64>,
    pub cuts: Vec<RiskCut>,
    pub report_path: PathBuf,
}

/// One full scoring-and-report pass. No trading.
pub async fn run_once(
    cfg: &AppConfig,
    provider: &dyn PriceProvider,
    notifier: &TelegramNotifier,
) -> Result<RunSummary> {
    let (start, end) = lookback_range(cfg.data.lookback_years);
    let kr = cfg.universe.kr.resolve();
    let us = cfg.universe.us.resolve();
    info!(
        kr = kr.len(),
        us = us.len(),
        %start,
        %end,
        "fetching universe prices"
    );

    let kr_prices = fetch_history(provider, &kr, start, end).await;
    let us_prices = fetch_history(provider, &us, start, end).await;

    let macro_regime = regime::compute_regime(&us_prices, &cfg.regime);
    if macro_regime.vix_spike {
        warn!("volatility spike flagged; execution treats this as a halt signal");
    }

    // Scoring universe: KR plus US, minus the untradable index series.
    let mut all_prices = PriceHistory::new();
    all_prices.merge(kr_prices);
    all_prices.merge(us_prices);
    all_prices.remove("^VIX");

    let scores = score_universe(&all_prices, &cfg.selection.score_weights);
    if scores.is_empty() {
        return Err(RebalError::InsufficientHistory(
            "no ticker has enough history to score".to_string(),
        ));
    }

    let selected = select(&scores, macro_regime.state, &cfg.selection);
    let target_weights = allocate_weights(&selected, cfg.selection.max_weight);
    let (final_weights, cuts) = apply_risk_cuts(&all_prices, &target_weights, &cfg.risk_cut);

    let rows = build_rows(&selected, &target_weights, &final_weights);
    let report_path = save_report(Path::new(&cfg.report.out_dir), &rows, &macro_regime, &cuts)?;

    let message = format!(
        "[rebal] {} score={:.2} cuts={} report={}",
        macro_regime.state,
        macro_regime.risk_score,
        cuts.len(),
        report_path.display()
    );
    info!("{message}");
    notifier.send(&message).await;

    Ok(RunSummary {
        regime: macro_regime,
        selected,
        target_weights,
        final_weights,
        cuts,
        report_path,
    })
}

/// Diff the final weights against the live account and execute the
/// resulting intents. Failed intents are reported and skipped, never
/// retried within a run.
pub async fn execute_rebalance(
    cfg: &AppConfig,
    broker: &dyn Broker,
    final_weights: &BTreeMap<String, f64>,
    vix_spike: bool,
) -> Result<Vec<ExecutionReport>> {
    if vix_spike {
        warn!("volatility spike halt: no orders will be submitted this run");
        return Ok(Vec::new());
    }

    broker.connect().await?;

    let equity = broker.portfolio_value().await?;
    let positions = broker.positions().await?;
    info!(%equity, positions = positions.len(), "account state fetched");

    let mut prices: BTreeMap<String, Decimal> = BTreeMap::new();
    for ticker in final_weights.keys() {
        let code = normalize_symbol(ticker);
        if code.is_empty() || prices.contains_key(&code) {
            continue;
        }
        let price = broker.last_price(&code).await?;
        if price > Decimal::ZERO {
            prices.insert(code, price);
        } else {
            warn!(%ticker, "no tradable price; target skipped");
        }
    }
    for symbol in positions.keys() {
        if !prices.contains_key(symbol) {
            let price = broker.last_price(symbol).await?;
            if price > Decimal::ZERO {
                prices.insert(symbol.clone(), price);
            }
        }
    }

    let intents = rebalance::plan_orders(
        equity,
        &positions,
        final_weights,
        &prices,
        cfg.rebalance.min_trade_value,
    );
    info!(count = intents.len(), "rebalance orders planned");

    let mut reports = Vec::new();
    for intent in &intents {
        match broker.place_order(intent).await {
            Ok(report) => reports.push(report),
            Err(e) => {
                // A failed intent stays partially executed; move on.
                warn!(symbol = %intent.symbol, "order intent failed: {e}");
            }
        }
    }
    Ok(reports)
}

//! Rebalance report rendering.
//!
//! Each run writes a timestamped CSV of the selection table plus a Markdown
//! report with the regime breakdown and any risk cuts. Reporting reads the
//! fill log and run summaries; it never feeds back into trading state.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;
use tracing::info;

use crate::engine::regime::MacroRegime;
use crate::engine::selection::{RiskCut, ScoreRow};
use crate::error::Result;

/// One line of the selection table.
#[derive(Debug, Clone, Serialize)]
pub struct ReportRow {
    pub ticker: String,
    pub score: f64,
    pub momentum: f64,
    pub trend: f64,
    pub vol: f64,
    pub mdd_1y: f64,
    pub weight_target: f64,
    pub weight_after_cuts: f64,
}

/// Assemble report rows from the scored selection and both weight maps.
/// The cash ticker can appear only after cuts; give it a row too.
pub fn build_rows(
    selected: &[ScoreRow],
    target_weights: &BTreeMap<String, f64>,
    final_weights: &BTreeMap<String, f64>,
) -> Vec<ReportRow> {
    let mut rows: Vec<ReportRow> = selected
        .iter()
        .map(|r| ReportRow {
            ticker: r.ticker.clone(),
            score: r.score,
            momentum: r.momentum,
            trend: r.trend,
            vol: r.vol,
            mdd_1y: r.mdd_1y,
            weight_target: target_weights.get(&r.ticker).copied().unwrap_or(0.0),
            weight_after_cuts: final_weights.get(&r.ticker).copied().unwrap_or(0.0),
        })
        .collect();

    for (ticker, &weight) in final_weights {
        if weight > 0.0 && !rows.iter().any(|r| &r.ticker == ticker) {
            rows.push(ReportRow {
                ticker: ticker.clone(),
                score: 0.0,
                momentum: 0.0,
                trend: 0.0,
                vol: 0.0,
                mdd_1y: 0.0,
                weight_target: target_weights.get(ticker).copied().unwrap_or(0.0),
                weight_after_cuts: weight,
            });
        }
    }

    rows.sort_by(|a, b| {
        b.weight_after_cuts
            .partial_cmp(&a.weight_after_cuts)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    rows
}

/// Write the CSV and Markdown artifacts; returns the Markdown path.
pub fn save_report(
    out_dir: &Path,
    rows: &[ReportRow],
    regime: &MacroRegime,
    cuts: &[RiskCut],
) -> Result<PathBuf> {
    std::fs::create_dir_all(out_dir)?;
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let csv_path = out_dir.join(format!("selection_{stamp}.csv"));
    let md_path = out_dir.join(format!("report_{stamp}.md"));

    let mut writer = csv::Writer::from_path(&csv_path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    let mut lines: Vec<String> = Vec::new();
    lines.push(format!("# ETF Rebalance Report {stamp}"));
    lines.push(String::new());
    lines.push("## Macro Regime".to_string());
    lines.push(format!("- state: {}", regime.state));
    lines.push(format!("- risk_score: {:.4}", regime.risk_score));
    lines.push(format!("- vix_spike: {}", regime.vix_spike));
    for (name, value) in &regime.details {
        lines.push(format!("- {name}: {value:.4}"));
    }
    lines.push(String::new());

    if !cuts.is_empty() {
        lines.push("## Risk Cuts".to_string());
        lines.push("| ticker | reasons | cut weight |".to_string());
        lines.push("|---|---|---|".to_string());
        for cut in cuts {
            lines.push(format!(
                "| {} | {} | {:.2}% |",
                cut.ticker,
                cut.reasons,
                cut.cut_weight * 100.0
            ));
        }
        lines.push(String::new());
    }

    lines.push("## Selected ETFs".to_string());
    lines.push("| ticker | score | momentum | vol | target | after cuts |".to_string());
    lines.push("|---|---|---|---|---|---|".to_string());
    for row in rows {
        lines.push(format!(
            "| {} | {:.3} | {:.3} | {:.3} | {:.2}% | {:.2}% |",
            row.ticker,
            row.score,
            row.momentum,
            row.vol,
            row.weight_target * 100.0,
            row.weight_after_cuts * 100.0
        ));
    }
    lines.push(String::new());

    std::fs::write(&md_path, lines.join("\n"))?;
    info!(path = %md_path.display(), "report written");
    Ok(md_path)
}

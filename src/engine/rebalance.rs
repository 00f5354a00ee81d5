//! Current -> target diff engine.
//!
//! Converts target weights plus live positions, cash and prices into the
//! order intents the execution engine consumes. Sells come first so cash
//! is freed before buys; positions absent from the targets are closed.
//! Long-only: sell quantities never exceed current holdings.

use std::collections::BTreeMap;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::domain::{normalize_symbol, OrderIntent, Side};

pub fn plan_orders(
    equity: Decimal,
    positions: &BTreeMap<String, u32>,
    targets: &BTreeMap<String, f64>,
    prices: &BTreeMap<String, Decimal>,
    min_trade_value: Decimal,
) -> Vec<OrderIntent> {
    // Targets arrive keyed by data-source tickers; trade on terminal codes.
    let mut coded_targets: BTreeMap<String, f64> = BTreeMap::new();
    for (ticker, &weight) in targets {
        let code = normalize_symbol(ticker);
        if code.is_empty() || weight <= 0.0 {
            continue;
        }
        *coded_targets.entry(code).or_insert(0.0) += weight;
    }

    let mut sells: Vec<OrderIntent> = Vec::new();
    let mut buys: Vec<OrderIntent> = Vec::new();

    // Close positions that fell out of the target set.
    for (symbol, &qty) in positions {
        if qty == 0 || coded_targets.contains_key(symbol) {
            continue;
        }
        match prices.get(symbol) {
            Some(&price) if price > Decimal::ZERO => {
                sells.push(OrderIntent::market(symbol.clone(), qty, Side::Sell));
            }
            _ => {}
        }
    }

    // Move each target toward its weight.
    for (symbol, &weight) in &coded_targets {
        let price = match prices.get(symbol) {
            Some(&p) if p > Decimal::ZERO => p,
            _ => continue,
        };
        let current_qty = positions.get(symbol).copied().unwrap_or(0);
        let current_value = price * Decimal::from(current_qty);
        let target_value = equity
            * Decimal::from_f64_retain(weight).unwrap_or_default();
        let diff_qty = ((target_value - current_value) / price)
            .trunc()
            .to_i64()
            .unwrap_or(0);
        if diff_qty == 0 {
            continue;
        }

        let notional = price * Decimal::from(diff_qty.unsigned_abs());
        if notional < min_trade_value {
            continue;
        }

        if diff_qty > 0 {
            buys.push(OrderIntent::market(
                symbol.clone(),
                diff_qty as u32,
                Side::Buy,
            ));
        } else {
            let sell_qty = (diff_qty.unsigned_abs() as u32).min(current_qty);
            if sell_qty > 0 {
                sells.push(OrderIntent::market(symbol.clone(), sell_qty, Side::Sell));
            }
        }
    }

    sells.extend(buys);
    sells
}

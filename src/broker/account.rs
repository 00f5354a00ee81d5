//! Read-only account and market queries.
//!
//! Each operation is one or more correlated TR requests plus indexed field
//! reads against the buffered response. Nothing here is cached; callers get
//! the terminal's current view every time.

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::debug;

use crate::broker::correlator::TrCorrelator;
use crate::domain::{normalize_symbol, UnfilledOrder};
use crate::error::Result;
use crate::terminal::{field, tr, Continuation, TerminalApi, SCREEN_NO};

pub struct AccountQueries {
    terminal: Arc<dyn TerminalApi>,
    correlator: Arc<TrCorrelator>,
    account_no: String,
}

impl AccountQueries {
    pub fn new(
        terminal: Arc<dyn TerminalApi>,
        correlator: Arc<TrCorrelator>,
        account_no: impl Into<String>,
    ) -> Self {
        Self {
            terminal,
            correlator,
            account_no: account_no.into(),
        }
    }

    /// Orderable cash, falling back to the raw deposit field.
    pub async fn cash(&self) -> Result<Decimal> {
        let inputs = [
            (field::ACCOUNT_NO, self.account_no.as_str()),
            (field::PASSWORD, ""),
            (field::PASSWORD_MEDIA, "00"),
            (field::QUERY_KIND, "2"),
        ];
        let reply = self
            .correlator
            .request(&inputs, "opw00001_req", tr::DEPOSIT, Continuation::Fresh, SCREEN_NO)
            .await?;

        for name in [field::ORDERABLE_CASH, field::DEPOSIT] {
            let raw = self
                .terminal
                .field(&reply.tr_code, &reply.rq_name, 0, name)
                .await?;
            if let Ok(v) = raw.trim().parse::<i64>() {
                if v > 0 {
                    return Ok(Decimal::from(v));
                }
            }
        }
        Ok(Decimal::ZERO)
    }

    /// Current holdings as symbol -> quantity, following continuation pages.
    pub async fn positions(&self) -> Result<BTreeMap<String, u32>> {
        let mut positions = BTreeMap::new();
        let mut continuation = Continuation::Fresh;
        loop {
            let inputs = [
                (field::ACCOUNT_NO, self.account_no.as_str()),
                (field::PASSWORD, ""),
                (field::PASSWORD_MEDIA, "00"),
                (field::QUERY_KIND, "2"),
            ];
            let reply = self
                .correlator
                .request(&inputs, "opw00018_req", tr::HOLDINGS, continuation, SCREEN_NO)
                .await?;

            let rows = self
                .terminal
                .row_count(&reply.tr_code, &reply.record_name)
                .await?;
            for row in 0..rows {
                let raw_code = self
                    .terminal
                    .field(&reply.tr_code, &reply.rq_name, row, field::POSITION_SYMBOL)
                    .await?;
                let raw_qty = self
                    .terminal
                    .field(&reply.tr_code, &reply.rq_name, row, field::POSITION_QTY)
                    .await?;

                let code = normalize_symbol(&raw_code);
                let qty: u32 = raw_qty.trim().parse().unwrap_or(0);
                if !code.is_empty() && qty > 0 {
                    *positions.entry(code).or_insert(0) += qty;
                }
            }

            continuation = reply.continuation;
            if !continuation.has_more() {
                break;
            }
        }
        debug!(count = positions.len(), "positions fetched");
        Ok(positions)
    }

    /// Last traded price; zero when the symbol is untradable or the field
    /// does not parse.
    pub async fn last_price(&self, ticker: &str) -> Result<Decimal> {
        let code = normalize_symbol(ticker);
        if code.is_empty() {
            return Ok(Decimal::ZERO);
        }
        let inputs = [(field::SYMBOL, code.as_str())];
        let rq_name = format!("{}_{}", tr::QUOTE, code);
        let reply = self
            .correlator
            .request(&inputs, &rq_name, tr::QUOTE, Continuation::Fresh, SCREEN_NO)
            .await?;

        let raw = self
            .terminal
            .field(&reply.tr_code, &reply.rq_name, 0, field::LAST_PRICE)
            .await?;
        // Quote fields are signed with the day's direction.
        Ok(raw
            .trim()
            .parse::<i64>()
            .map(|v| Decimal::from(v.abs()))
            .unwrap_or(Decimal::ZERO))
    }

    /// Open orders the terminal reports as not fully filled.
    pub async fn unfilled_orders(&self) -> Result<Vec<UnfilledOrder>> {
        let inputs = [
            (field::ACCOUNT_NO, self.account_no.as_str()),
            (field::FILL_STATE, "1"),
            (field::TRADE_KIND, "0"),
        ];
        let reply = self
            .correlator
            .request(&inputs, "opt10075_req", tr::OUTSTANDING, Continuation::Fresh, SCREEN_NO)
            .await?;

        let rows = self
            .terminal
            .row_count(&reply.tr_code, &reply.record_name)
            .await?;
        let mut unfilled = Vec::new();
        for row in 0..rows {
            let order_id = self
                .terminal
                .field(&reply.tr_code, &reply.rq_name, row, field::ORDER_NO)
                .await?
                .trim()
                .to_string();
            let raw_code = self
                .terminal
                .field(&reply.tr_code, &reply.rq_name, row, field::SYMBOL)
                .await?;
            let raw_remaining = self
                .terminal
                .field(&reply.tr_code, &reply.rq_name, row, field::UNFILLED_QTY)
                .await?;
            let side_code = self
                .terminal
                .field(&reply.tr_code, &reply.rq_name, row, field::TRADE_KIND)
                .await?
                .trim()
                .to_string();

            let symbol = normalize_symbol(&raw_code);
            let remaining_qty: u32 = raw_remaining.trim().parse().unwrap_or(0);
            if !order_id.is_empty() && !symbol.is_empty() && remaining_qty > 0 {
                unfilled.push(UnfilledOrder {
                    order_id,
                    symbol,
                    remaining_qty,
                    side_code,
                });
            }
        }
        Ok(unfilled)
    }

    /// Cash plus the marked value of every position. Derived on each call,
    /// never cached.
    pub async fn portfolio_value(&self) -> Result<Decimal> {
        let mut total = self.cash().await?;
        for (symbol, qty) in self.positions().await? {
            let price = self.last_price(&symbol).await?;
            total += price * Decimal::from(qty);
        }
        Ok(total)
    }
}

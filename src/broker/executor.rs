//! Order execution state machine.
//!
//! Turns one [`OrderIntent`] into a series of sliced market orders:
//! gate on market hours, split the quantity, then per slice capture a
//! reference price, submit, await fills, and check realized slippage.
//! A slice that fills nothing within the wait window is cancelled and its
//! remaining quantity resubmitted in full, after which the remaining slices
//! are abandoned; the reorder now carries the remainder. A slippage breach
//! likewise halts further slices. It protects the rest of the order from a
//! bad tape, it is not a retry trigger.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::broker::account::AccountQueries;
use crate::broker::fills::FillTracker;
use crate::broker::market_hours::{exchange_now, is_market_open, is_near_close};
use crate::broker::rate_limit::RateLimiter;
use crate::config::ExecutionConfig;
use crate::domain::{
    normalize_symbol, split_quantity, ExecutionOutcome, ExecutionReport, OrderIntent, OrderKind,
    Side, Slice, UnfilledOrder,
};
use crate::error::{BrokerError, RebalError, Result};
use crate::terminal::{OrderTicket, TerminalApi};

pub struct OrderExecutor {
    terminal: Arc<dyn TerminalApi>,
    tracker: Arc<FillTracker>,
    rate: Arc<RateLimiter>,
    account: Arc<AccountQueries>,
    config: ExecutionConfig,
    account_no: String,
    simulate: bool,
}

impl OrderExecutor {
    pub fn new(
        terminal: Arc<dyn TerminalApi>,
        tracker: Arc<FillTracker>,
        rate: Arc<RateLimiter>,
        account: Arc<AccountQueries>,
        config: ExecutionConfig,
        account_no: impl Into<String>,
        simulate: bool,
    ) -> Self {
        Self {
            terminal,
            tracker,
            rate,
            account,
            config,
            account_no: account_no.into(),
            simulate,
        }
    }

    /// Execute one order intent to its terminal outcome.
    pub async fn execute(&self, intent: &OrderIntent) -> Result<ExecutionReport> {
        if intent.kind != OrderKind::Market {
            return Err(BrokerError::UnsupportedOrderKind(intent.kind).into());
        }
        let symbol = normalize_symbol(&intent.symbol);
        if symbol.is_empty() || intent.quantity == 0 {
            return Err(RebalError::Validation(format!(
                "unorderable intent: {:?} x {}",
                intent.symbol, intent.quantity
            )));
        }

        let now = exchange_now();
        if self.config.require_market_open && !is_market_open(now) {
            info!(%symbol, "market closed; order skipped");
            return Ok(ExecutionReport::skipped(
                &symbol,
                intent.side,
                intent.quantity,
                ExecutionOutcome::MarketClosed,
            ));
        }
        if self.config.block_near_close && is_near_close(now) {
            info!(%symbol, "inside pre-close block; order skipped");
            return Ok(ExecutionReport::skipped(
                &symbol,
                intent.side,
                intent.quantity,
                ExecutionOutcome::NearClose,
            ));
        }

        let slices: Vec<Slice> = split_quantity(intent.quantity, self.config.split_count)
            .into_iter()
            .enumerate()
            .map(|(index, quantity)| Slice { index, quantity })
            .collect();

        if self.simulate {
            for slice in &slices {
                if slice.quantity == 0 {
                    continue;
                }
                info!(
                    "[SIM] {} {} x {} (slice {}/{})",
                    intent.side,
                    symbol,
                    slice.quantity,
                    slice.index + 1,
                    slices.len()
                );
            }
            return Ok(ExecutionReport {
                symbol,
                side: intent.side,
                requested_qty: intent.quantity,
                executed_qty: intent.quantity,
                avg_price: None,
                outcome: ExecutionOutcome::Simulated,
            });
        }

        let mut executed: u32 = 0;
        let mut executed_value = Decimal::ZERO;
        let mut outcome = ExecutionOutcome::Completed;

        for slice in &slices {
            if slice.quantity == 0 {
                continue;
            }

            let reference = self.account.last_price(&symbol).await?;

            let done_rx = self.tracker.arm(&symbol, slice.quantity);
            if let Err(e) = self.submit_market(&symbol, slice.quantity, intent.side).await {
                // A rejected submission only loses this slice.
                self.tracker.disarm();
                warn!(%symbol, slice = slice.index + 1, "slice submission failed: {e}");
                continue;
            }

            // Timeout here is a recognized state (zero fill), not an error.
            let _ = tokio::time::timeout(self.fill_wait(), done_rx).await;
            let snapshot = self.tracker.disarm();

            if snapshot.filled_qty == 0 {
                info!(%symbol, slice = slice.index + 1, "no fill within window; cancel and reorder");
                self.cancel_and_reorder(&symbol, intent.side).await?;
                outcome = ExecutionOutcome::Reordered;
                break;
            }

            executed += snapshot.filled_qty;
            executed_value += snapshot.avg_fill_price * Decimal::from(snapshot.filled_qty);

            let bps = slippage_bps(reference, snapshot.avg_fill_price);
            if bps.abs() > self.config.slippage_limit_bps {
                warn!(
                    %symbol,
                    slippage_bps = %bps,
                    limit_bps = %self.config.slippage_limit_bps,
                    "slippage limit breached; halting remaining slices"
                );
                outcome = ExecutionOutcome::SlippageHalted;
                break;
            }

            tokio::time::sleep(Duration::from_millis(self.config.settle_ms)).await;
        }

        let avg_price = (executed > 0).then(|| executed_value / Decimal::from(executed));
        Ok(ExecutionReport {
            symbol,
            side: intent.side,
            requested_qty: intent.quantity,
            executed_qty: executed,
            avg_price,
            outcome,
        })
    }

    /// Cancel every resting order for `symbol` and resubmit its remaining
    /// quantity as a fresh market order. The reorder is not awaited; its
    /// fills land in the log through the normal event path.
    async fn cancel_and_reorder(&self, symbol: &str, side: Side) -> Result<()> {
        let unfilled: Vec<UnfilledOrder> = self
            .account
            .unfilled_orders()
            .await?
            .into_iter()
            .filter(|u| u.symbol == symbol)
            .collect();

        if unfilled.is_empty() {
            warn!(%symbol, "zero fill but no resting order found");
            return Ok(());
        }

        for order in unfilled {
            if let Err(e) = self.cancel(&order).await {
                warn!(order_id = %order.order_id, "cancel failed: {e}");
                continue;
            }
            tokio::time::sleep(Duration::from_millis(self.config.reorder_pause_ms)).await;
            if let Err(e) = self
                .submit_market(symbol, order.remaining_qty, side)
                .await
            {
                warn!(order_id = %order.order_id, "reorder submission failed: {e}");
            } else {
                info!(
                    %symbol,
                    qty = order.remaining_qty,
                    "cancelled {} and resubmitted remainder at market",
                    order.order_id
                );
            }
        }
        Ok(())
    }

    async fn submit_market(&self, symbol: &str, quantity: u32, side: Side) -> Result<()> {
        self.rate.acquire().await;
        let ticket = OrderTicket::market(&self.account_no, symbol, quantity, side);
        let code = self.terminal.send_order(&ticket).await?;
        if code != 0 {
            return Err(BrokerError::Submission {
                code,
                symbol: symbol.to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn cancel(&self, order: &UnfilledOrder) -> Result<()> {
        self.rate.acquire().await;
        let ticket = OrderTicket::cancel(&self.account_no, &order.symbol, &order.order_id);
        let code = self.terminal.send_order(&ticket).await?;
        if code != 0 {
            return Err(BrokerError::Submission {
                code,
                symbol: order.symbol.clone(),
            }
            .into());
        }
        Ok(())
    }

    fn fill_wait(&self) -> Duration {
        Duration::from_secs(self.config.fill_wait_secs)
    }
}

/// Signed deviation of the realized average from the reference price, in
/// basis points. Zero when either price is unusable.
pub fn slippage_bps(reference: Decimal, avg_fill: Decimal) -> Decimal {
    if reference <= Decimal::ZERO || avg_fill <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (avg_fill - reference) / reference * Decimal::from(10_000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn slippage_is_measured_in_basis_points() {
        // 100 -> 100.5 is 50 bps
        assert_eq!(slippage_bps(dec!(100), dec!(100.5)), dec!(50));
        // symmetric on the downside
        assert_eq!(slippage_bps(dec!(100), dec!(99.5)), dec!(-50));
    }

    #[test]
    fn fifty_bps_breaches_a_thirty_bps_limit() {
        let limit = dec!(30);
        let bps = slippage_bps(dec!(100), dec!(100.5));
        assert!(bps.abs() > limit);
    }

    #[test]
    fn boundary_passes_at_exactly_the_limit() {
        let limit = dec!(50);
        let at_limit = slippage_bps(dec!(100), dec!(100.5));
        assert!(at_limit.abs() <= limit, "exactly the limit must pass");

        let above = slippage_bps(dec!(100), dec!(100.51));
        assert!(above.abs() > limit, "one tick above the limit must fail");
    }

    #[test]
    fn unusable_prices_never_flag_slippage() {
        assert_eq!(slippage_bps(Decimal::ZERO, dec!(100)), Decimal::ZERO);
        assert_eq!(slippage_bps(dec!(100), Decimal::ZERO), Decimal::ZERO);
    }
}

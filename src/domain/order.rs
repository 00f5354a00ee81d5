use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Order kind
///
/// The execution engine only accepts `Market`; anything else is rejected
/// up front with a typed error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderKind {
    Market,
    Limit,
}

impl std::fmt::Display for OrderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderKind::Market => write!(f, "MARKET"),
            OrderKind::Limit => write!(f, "LIMIT"),
        }
    }
}

/// A target trade for one ticker. Immutable once handed to the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderIntent {
    pub symbol: String,
    pub quantity: u32,
    pub side: Side,
    pub kind: OrderKind,
}

impl OrderIntent {
    pub fn market(symbol: impl Into<String>, quantity: u32, side: Side) -> Self {
        Self {
            symbol: symbol.into(),
            quantity,
            side,
            kind: OrderKind::Market,
        }
    }

    /// Value of the intent at a given price
    pub fn notional(&self, price: Decimal) -> Decimal {
        price * Decimal::from(self.quantity)
    }
}

/// One fraction of an order intent, submitted as a discrete market order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    pub index: usize,
    pub quantity: u32,
}

/// Split `quantity` into `parts` near-equal integer slices.
///
/// The remainder is distributed one unit at a time to the leading slices,
/// so any two slices differ by at most 1 and the parts sum to `quantity`
/// (e.g. 10 over 3 -> [4, 3, 3]).
pub fn split_quantity(quantity: u32, parts: u32) -> Vec<u32> {
    let parts = parts.max(1);
    let base = quantity / parts;
    let remainder = quantity % parts;
    (0..parts)
        .map(|i| base + u32::from(i < remainder))
        .collect()
}

/// Confirmation that some quantity of a submitted order executed at a price.
/// Append-only; never mutated once written to the fill log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillEvent {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub quantity: u32,
    pub price: Decimal,
    pub side: Side,
}

/// Running fill state for the slice currently awaiting execution.
/// Owned by the executor for one slice's lifetime; reset between slices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionSnapshot {
    pub filled_qty: u32,
    pub avg_fill_price: Decimal,
    pub done: bool,
}

impl ExecutionSnapshot {
    /// Fold one fill into the running volume-weighted average.
    pub fn apply_fill(&mut self, quantity: u32, price: Decimal) {
        if quantity == 0 {
            return;
        }
        let prev_qty = Decimal::from(self.filled_qty);
        let new_qty = prev_qty + Decimal::from(quantity);
        let total_value = self.avg_fill_price * prev_qty + price * Decimal::from(quantity);
        self.filled_qty += quantity;
        self.avg_fill_price = total_value / new_qty;
    }
}

/// A resting order the terminal reports as not yet (fully) filled.
/// Queried on demand, never cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnfilledOrder {
    pub order_id: String,
    pub symbol: String,
    pub remaining_qty: u32,
    pub side_code: String,
}

/// Terminal outcome of processing one order intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// All slices processed normally
    Completed,
    /// Gate: market closed, nothing submitted
    MarketClosed,
    /// Gate: inside the pre-close block window, nothing submitted
    NearClose,
    /// A zero-fill slice was cancelled and resubmitted; remaining slices skipped
    Reordered,
    /// Realized slippage breached the limit; remaining slices skipped
    SlippageHalted,
    /// Simulate mode: transitions walked, no terminal calls
    Simulated,
}

impl std::fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionOutcome::Completed => "completed",
            ExecutionOutcome::MarketClosed => "market_closed",
            ExecutionOutcome::NearClose => "near_close",
            ExecutionOutcome::Reordered => "reordered",
            ExecutionOutcome::SlippageHalted => "slippage_halted",
            ExecutionOutcome::Simulated => "simulated",
        };
        write!(f, "{s}")
    }
}

/// What actually happened to an order intent, slice by slice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub symbol: String,
    pub side: Side,
    pub requested_qty: u32,
    pub executed_qty: u32,
    pub avg_price: Option<Decimal>,
    pub outcome: ExecutionOutcome,
}

impl ExecutionReport {
    pub fn skipped(symbol: &str, side: Side, requested_qty: u32, outcome: ExecutionOutcome) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            requested_qty,
            executed_qty: 0,
            avg_price: None,
            outcome,
        }
    }

    pub fn is_fully_executed(&self) -> bool {
        self.executed_qty >= self.requested_qty
    }
}

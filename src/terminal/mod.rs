//! Brokerage terminal boundary.
//!
//! The vendor terminal is a local, stateful, callback-driven API: outbound
//! calls return immediately (or with a bare return code) and results arrive
//! as events on the terminal's own dispatch thread. `TerminalApi` is the
//! outbound surface; inbound callbacks are delivered as [`TerminalEvent`]s
//! on an unbounded channel owned by the session.

pub mod bridge;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::Side;
use crate::error::Result;

/// TR codes for the named requests the query layer issues.
pub mod tr {
    /// Account deposit / orderable cash
    pub const DEPOSIT: &str = "opw00001";
    /// Account holdings (paged)
    pub const HOLDINGS: &str = "opw00018";
    /// Single-instrument quote
    pub const QUOTE: &str = "opt10001";
    /// Outstanding (unfilled) orders
    pub const OUTSTANDING: &str = "opt10075";
}

/// Input and response field names, as the vendor terminal spells them.
pub mod field {
    pub const ACCOUNT_NO: &str = "계좌번호";
    pub const PASSWORD: &str = "비밀번호";
    pub const PASSWORD_MEDIA: &str = "비밀번호입력매체구분";
    pub const QUERY_KIND: &str = "조회구분";
    pub const SYMBOL: &str = "종목코드";
    pub const FILL_STATE: &str = "체결구분";
    pub const TRADE_KIND: &str = "매매구분";

    pub const DEPOSIT: &str = "예수금";
    pub const ORDERABLE_CASH: &str = "주문가능금액";
    pub const POSITION_SYMBOL: &str = "종목번호";
    pub const POSITION_QTY: &str = "보유수량";
    pub const LAST_PRICE: &str = "현재가";
    pub const ORDER_NO: &str = "주문번호";
    pub const UNFILLED_QTY: &str = "미체결수량";
}

/// Order type codes for `SendOrder`.
pub mod order_code {
    pub const NEW_BUY: i32 = 1;
    pub const NEW_SELL: i32 = 2;
    pub const CANCEL: i32 = 3;
    /// Price type: market
    pub const PRICE_MARKET: &str = "03";
}

/// Default screen number for all requests issued by this process.
pub const SCREEN_NO: &str = "1000";

/// Paging marker carried by repeated-record responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Continuation {
    /// First (or only) page
    Fresh,
    /// More rows remain; re-issue the request with this marker
    More,
}

impl Continuation {
    /// The terminal encodes continuation as the `prev_next` flag: "2" means
    /// more pages exist, anything else means done.
    pub fn from_flag(flag: &str) -> Self {
        if flag.trim() == "2" {
            Continuation::More
        } else {
            Continuation::Fresh
        }
    }

    pub fn as_flag(&self) -> &'static str {
        match self {
            Continuation::Fresh => "0",
            Continuation::More => "2",
        }
    }

    pub fn has_more(&self) -> bool {
        matches!(self, Continuation::More)
    }
}

/// Parsed "data ready" reply to a named TR request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrReply {
    pub rq_name: String,
    pub tr_code: String,
    pub record_name: String,
    pub continuation: Continuation,
}

/// One execution ("chejan") callback event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionNotice {
    pub symbol: String,
    pub filled_qty: u32,
    pub fill_price: Decimal,
    pub side: Side,
    /// True when the terminal reports the order as fully done.
    pub complete: bool,
}

/// Inbound callback stream from the terminal.
#[derive(Debug, Clone)]
pub enum TerminalEvent {
    /// Login handshake finished; 0 means success.
    Connect { code: i32 },
    /// A named request's data is ready to be read.
    TrData(TrReply),
    /// An execution event for one of our orders.
    Execution(ExecutionNotice),
}

/// Everything `SendOrder` needs for one submission or cancel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderTicket {
    pub rq_name: String,
    pub screen: String,
    pub account: String,
    pub order_type: i32,
    pub symbol: String,
    pub quantity: u32,
    pub price: u32,
    pub price_type: String,
    /// Order number being cancelled; empty for new orders.
    pub original_order_id: String,
}

impl OrderTicket {
    pub fn market(account: &str, symbol: &str, quantity: u32, side: Side) -> Self {
        let order_type = match side {
            Side::Buy => order_code::NEW_BUY,
            Side::Sell => order_code::NEW_SELL,
        };
        Self {
            rq_name: format!("order_{side}_{symbol}_{}", uuid::Uuid::new_v4().simple()),
            screen: SCREEN_NO.to_string(),
            account: account.to_string(),
            order_type,
            symbol: symbol.to_string(),
            quantity,
            price: 0,
            price_type: order_code::PRICE_MARKET.to_string(),
            original_order_id: String::new(),
        }
    }

    pub fn cancel(account: &str, symbol: &str, original_order_id: &str) -> Self {
        Self {
            rq_name: "cancel".to_string(),
            screen: SCREEN_NO.to_string(),
            account: account.to_string(),
            order_type: order_code::CANCEL,
            symbol: symbol.to_string(),
            quantity: 0,
            price: 0,
            price_type: "00".to_string(),
            original_order_id: original_order_id.to_string(),
        }
    }
}

/// Outbound surface of the terminal.
///
/// Implementations must be cheap to share (`Arc<dyn TerminalApi>`); every
/// call is serialized by the single driving path, so no internal request
/// queuing is required.
#[async_trait]
pub trait TerminalApi: Send + Sync {
    /// Start the login handshake. Completion arrives as
    /// [`TerminalEvent::Connect`].
    async fn begin_connect(&self) -> Result<()>;

    /// Stage one input value for the next named request.
    async fn set_input(&self, key: &str, value: &str) -> Result<()>;

    /// Issue a named TR request. Data readiness arrives as
    /// [`TerminalEvent::TrData`].
    async fn request(
        &self,
        rq_name: &str,
        tr_code: &str,
        continuation: Continuation,
        screen: &str,
    ) -> Result<()>;

    /// Submit or cancel an order. Returns the terminal's immediate return
    /// code; 0 means accepted.
    async fn send_order(&self, ticket: &OrderTicket) -> Result<i32>;

    /// Read one field of the buffered response by row and name.
    async fn field(&self, tr_code: &str, rq_name: &str, row: usize, name: &str) -> Result<String>;

    /// Number of repeated rows in the buffered response.
    async fn row_count(&self, tr_code: &str, record_name: &str) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continuation_flag_roundtrip() {
        assert_eq!(Continuation::from_flag("2"), Continuation::More);
        assert_eq!(Continuation::from_flag(" 2 "), Continuation::More);
        assert_eq!(Continuation::from_flag("0"), Continuation::Fresh);
        assert_eq!(Continuation::from_flag(""), Continuation::Fresh);
        assert!(Continuation::More.has_more());
        assert!(!Continuation::Fresh.has_more());
    }

    #[test]
    fn market_ticket_uses_side_specific_type_code() {
        let buy = OrderTicket::market("8012345611", "069500", 4, Side::Buy);
        assert_eq!(buy.order_type, order_code::NEW_BUY);
        assert_eq!(buy.price, 0);
        assert_eq!(buy.price_type, order_code::PRICE_MARKET);
        assert!(buy.original_order_id.is_empty());

        let sell = OrderTicket::market("8012345611", "069500", 4, Side::Sell);
        assert_eq!(sell.order_type, order_code::NEW_SELL);
    }

    #[test]
    fn cancel_ticket_references_original_order() {
        let cancel = OrderTicket::cancel("8012345611", "069500", "0001234");
        assert_eq!(cancel.order_type, order_code::CANCEL);
        assert_eq!(cancel.original_order_id, "0001234");
        assert_eq!(cancel.quantity, 0);
    }
}

//! End-to-end execution tests over a scripted in-memory terminal.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;

use rebal::broker::{Broker, TerminalBroker};
use rebal::config::{BrokerConfig, ExecutionConfig};
use rebal::domain::{ExecutionOutcome, OrderIntent, OrderKind, Side};
use rebal::error::{BrokerError, RebalError, Result};
use rebal::terminal::{
    field, order_code, tr, Continuation, ExecutionNotice, OrderTicket, TerminalApi, TerminalEvent,
    TrReply,
};

/// How the scripted terminal answers new orders.
#[derive(Clone, Copy)]
enum FillPlan {
    /// Every order fills in full at this price, immediately.
    FullAt(i64),
    /// Orders are accepted but never fill.
    Silent,
}

struct UnfilledRow {
    order_id: &'static str,
    symbol: &'static str,
    remaining: &'static str,
    side_code: &'static str,
}

struct ScriptedTerminal {
    event_tx: mpsc::UnboundedSender<TerminalEvent>,
    fill_plan: FillPlan,
    /// Last-price string served for quote requests.
    quote_price: &'static str,
    unfilled_rows: Vec<UnfilledRow>,
    /// Pages of (symbol, quantity) rows for the holdings query.
    position_pages: Vec<Vec<(&'static str, &'static str)>>,
    cash: &'static str,
    order_return_code: i32,

    sent: Mutex<Vec<OrderTicket>>,
    requested_trs: Mutex<Vec<String>>,
    holdings_page: AtomicUsize,
    served_page: AtomicUsize,
}

impl ScriptedTerminal {
    fn new(event_tx: mpsc::UnboundedSender<TerminalEvent>, fill_plan: FillPlan) -> Self {
        Self {
            event_tx,
            fill_plan,
            quote_price: "100",
            unfilled_rows: Vec::new(),
            position_pages: Vec::new(),
            cash: "0",
            order_return_code: 0,
            sent: Mutex::new(Vec::new()),
            requested_trs: Mutex::new(Vec::new()),
            holdings_page: AtomicUsize::new(0),
            served_page: AtomicUsize::new(0),
        }
    }

    fn sent_tickets(&self) -> Vec<OrderTicket> {
        self.sent.lock().unwrap().clone()
    }

    fn terminal_calls(&self) -> usize {
        self.sent.lock().unwrap().len() + self.requested_trs.lock().unwrap().len()
    }
}

#[async_trait]
impl TerminalApi for ScriptedTerminal {
    async fn begin_connect(&self) -> Result<()> {
        let _ = self.event_tx.send(TerminalEvent::Connect { code: 0 });
        Ok(())
    }

    async fn set_input(&self, _key: &str, _value: &str) -> Result<()> {
        Ok(())
    }

    async fn request(
        &self,
        rq_name: &str,
        tr_code: &str,
        _continuation: Continuation,
        _screen: &str,
    ) -> Result<()> {
        self.requested_trs.lock().unwrap().push(tr_code.to_string());

        let continuation = if tr_code == tr::HOLDINGS {
            let page = self.holdings_page.fetch_add(1, Ordering::SeqCst);
            self.served_page.store(page, Ordering::SeqCst);
            if page + 1 < self.position_pages.len() {
                Continuation::More
            } else {
                Continuation::Fresh
            }
        } else {
            Continuation::Fresh
        };

        let reply = TrReply {
            rq_name: rq_name.to_string(),
            tr_code: tr_code.to_string(),
            record_name: tr_code.to_string(),
            continuation,
        };
        self.event_tx
            .send(TerminalEvent::TrData(reply))
            .map_err(|_| BrokerError::Transport("event channel closed".into()))?;
        Ok(())
    }

    async fn send_order(&self, ticket: &OrderTicket) -> Result<i32> {
        self.sent.lock().unwrap().push(ticket.clone());
        if self.order_return_code != 0 {
            return Ok(self.order_return_code);
        }

        let is_new_order =
            ticket.order_type == order_code::NEW_BUY || ticket.order_type == order_code::NEW_SELL;
        if is_new_order {
            if let FillPlan::FullAt(price) = self.fill_plan {
                let side = if ticket.order_type == order_code::NEW_BUY {
                    Side::Buy
                } else {
                    Side::Sell
                };
                let _ = self.event_tx.send(TerminalEvent::Execution(ExecutionNotice {
                    symbol: ticket.symbol.clone(),
                    filled_qty: ticket.quantity,
                    fill_price: Decimal::from(price),
                    side,
                    complete: true,
                }));
            }
        }
        Ok(0)
    }

    async fn field(&self, tr_code: &str, _rq_name: &str, row: usize, name: &str) -> Result<String> {
        let value = match tr_code {
            t if t == tr::QUOTE => match name {
                field::LAST_PRICE => self.quote_price.to_string(),
                _ => String::new(),
            },
            t if t == tr::DEPOSIT => match name {
                field::ORDERABLE_CASH | field::DEPOSIT => self.cash.to_string(),
                _ => String::new(),
            },
            t if t == tr::OUTSTANDING => {
                let Some(r) = self.unfilled_rows.get(row) else {
                    return Ok(String::new());
                };
                match name {
                    field::ORDER_NO => r.order_id.to_string(),
                    field::SYMBOL => r.symbol.to_string(),
                    field::UNFILLED_QTY => r.remaining.to_string(),
                    field::TRADE_KIND => r.side_code.to_string(),
                    _ => String::new(),
                }
            }
            t if t == tr::HOLDINGS => {
                let page = self.served_page.load(Ordering::SeqCst);
                let Some(rows) = self.position_pages.get(page) else {
                    return Ok(String::new());
                };
                let Some((symbol, qty)) = rows.get(row) else {
                    return Ok(String::new());
                };
                match name {
                    field::POSITION_SYMBOL => symbol.to_string(),
                    field::POSITION_QTY => qty.to_string(),
                    _ => String::new(),
                }
            }
            _ => String::new(),
        };
        Ok(value)
    }

    async fn row_count(&self, tr_code: &str, _record_name: &str) -> Result<usize> {
        let count = match tr_code {
            t if t == tr::OUTSTANDING => self.unfilled_rows.len(),
            t if t == tr::HOLDINGS => {
                let page = self.served_page.load(Ordering::SeqCst);
                self.position_pages.get(page).map_or(0, |rows| rows.len())
            }
            _ => 1,
        };
        Ok(count)
    }
}

fn test_config(dir: &tempfile::TempDir, simulate: bool) -> (BrokerConfig, ExecutionConfig) {
    let broker = BrokerConfig {
        account_no: "8012345611".to_string(),
        simulate,
        fill_log_path: dir
            .path()
            .join("fills.jsonl")
            .to_string_lossy()
            .into_owned(),
        rate_limit_per_sec: 100,
        login_timeout_secs: 1,
        reply_timeout_secs: 5,
        ..BrokerConfig::default()
    };
    let exec = ExecutionConfig {
        split_count: 3,
        slippage_limit_bps: dec!(30),
        require_market_open: false,
        block_near_close: false,
        fill_wait_secs: 1,
        settle_ms: 10,
        reorder_pause_ms: 10,
    };
    (broker, exec)
}

fn build_broker(
    terminal: &Arc<ScriptedTerminal>,
    events: mpsc::UnboundedReceiver<TerminalEvent>,
    broker_cfg: &BrokerConfig,
    exec_cfg: &ExecutionConfig,
) -> TerminalBroker {
    TerminalBroker::assemble(
        Arc::clone(terminal) as Arc<dyn TerminalApi>,
        events,
        broker_cfg,
        exec_cfg,
    )
}

fn new_order_tickets(tickets: &[OrderTicket]) -> Vec<&OrderTicket> {
    tickets
        .iter()
        .filter(|t| t.order_type == order_code::NEW_BUY || t.order_type == order_code::NEW_SELL)
        .collect()
}

#[tokio::test]
async fn sliced_order_fills_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    let terminal = Arc::new(ScriptedTerminal::new(tx, FillPlan::FullAt(100)));
    let (broker_cfg, exec_cfg) = test_config(&dir, false);
    let broker = build_broker(&terminal, rx, &broker_cfg, &exec_cfg);

    let report = broker
        .place_order(&OrderIntent::market("069500", 10, Side::Buy))
        .await
        .expect("order executes");

    assert_eq!(report.outcome, ExecutionOutcome::Completed);
    assert_eq!(report.executed_qty, 10);
    assert_eq!(report.avg_price, Some(dec!(100)));

    // 10 over 3 slices -> 4, 3, 3 discrete market orders.
    let tickets = terminal.sent_tickets();
    let orders = new_order_tickets(&tickets);
    assert_eq!(orders.len(), 3);
    assert_eq!(
        orders.iter().map(|t| t.quantity).collect::<Vec<_>>(),
        vec![4, 3, 3]
    );
    assert!(orders.iter().all(|t| t.price_type == order_code::PRICE_MARKET));
}

#[tokio::test]
async fn zero_fill_cancels_and_stops() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    let mut scripted = ScriptedTerminal::new(tx, FillPlan::Silent);
    scripted.unfilled_rows = vec![UnfilledRow {
        order_id: "0001234",
        symbol: "069500",
        remaining: "4",
        side_code: "2",
    }];
    let terminal = Arc::new(scripted);
    let (broker_cfg, exec_cfg) = test_config(&dir, false);
    let broker = build_broker(&terminal, rx, &broker_cfg, &exec_cfg);

    let report = broker
        .place_order(&OrderIntent::market("069500", 10, Side::Buy))
        .await
        .expect("order intent processes");

    assert_eq!(report.outcome, ExecutionOutcome::Reordered);
    assert_eq!(report.executed_qty, 0);

    let tickets = terminal.sent_tickets();
    // First slice, then exactly one cancel and one reorder. The remaining
    // two slices are never submitted.
    assert_eq!(tickets.len(), 3);
    assert_eq!(tickets[0].order_type, order_code::NEW_BUY);
    assert_eq!(tickets[0].quantity, 4);

    assert_eq!(tickets[1].order_type, order_code::CANCEL);
    assert_eq!(tickets[1].original_order_id, "0001234");

    assert_eq!(tickets[2].order_type, order_code::NEW_BUY);
    assert_eq!(tickets[2].quantity, 4, "full remaining quantity resubmitted");
    assert_eq!(tickets[2].price_type, order_code::PRICE_MARKET);
}

#[tokio::test]
async fn slippage_breach_halts_remaining_slices() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    // Reference quote is 100; fills land at 101 = 100 bps over a 30 bps limit.
    let terminal = Arc::new(ScriptedTerminal::new(tx, FillPlan::FullAt(101)));
    let (broker_cfg, exec_cfg) = test_config(&dir, false);
    let broker = build_broker(&terminal, rx, &broker_cfg, &exec_cfg);

    let report = broker
        .place_order(&OrderIntent::market("069500", 10, Side::Buy))
        .await
        .expect("order intent processes");

    assert_eq!(report.outcome, ExecutionOutcome::SlippageHalted);
    assert_eq!(report.executed_qty, 4, "only the first slice filled");

    let tickets = terminal.sent_tickets();
    assert_eq!(new_order_tickets(&tickets).len(), 1);
}

#[tokio::test]
async fn slippage_within_limit_continues() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    // 10000 -> 10025 is 25 bps, inside the 30 bps limit.
    let mut scripted = ScriptedTerminal::new(tx, FillPlan::FullAt(10025));
    scripted.quote_price = "10000";
    let terminal = Arc::new(scripted);
    let (broker_cfg, exec_cfg) = test_config(&dir, false);
    let broker = build_broker(&terminal, rx, &broker_cfg, &exec_cfg);

    let report = broker
        .place_order(&OrderIntent::market("069500", 9, Side::Sell))
        .await
        .expect("order executes");

    assert_eq!(report.outcome, ExecutionOutcome::Completed);
    assert_eq!(report.executed_qty, 9);
    let tickets = terminal.sent_tickets();
    let orders = new_order_tickets(&tickets);
    assert_eq!(orders.len(), 3);
    assert!(orders.iter().all(|t| t.order_type == order_code::NEW_SELL));
}

#[tokio::test]
async fn simulate_mode_never_touches_the_terminal() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    let terminal = Arc::new(ScriptedTerminal::new(tx, FillPlan::FullAt(100)));
    let (broker_cfg, exec_cfg) = test_config(&dir, true);
    let broker = build_broker(&terminal, rx, &broker_cfg, &exec_cfg);

    let report = broker
        .place_order(&OrderIntent::market("069500", 10, Side::Buy))
        .await
        .expect("simulated order completes");

    assert_eq!(report.outcome, ExecutionOutcome::Simulated);
    assert_eq!(report.executed_qty, 10, "deterministic completion per slice");
    assert_eq!(terminal.terminal_calls(), 0, "no terminal calls of any kind");
}

#[tokio::test]
async fn non_market_order_kind_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    let terminal = Arc::new(ScriptedTerminal::new(tx, FillPlan::FullAt(100)));
    let (broker_cfg, exec_cfg) = test_config(&dir, false);
    let broker = build_broker(&terminal, rx, &broker_cfg, &exec_cfg);

    let intent = OrderIntent {
        symbol: "069500".to_string(),
        quantity: 10,
        side: Side::Buy,
        kind: OrderKind::Limit,
    };
    let err = broker.place_order(&intent).await.expect_err("must reject");
    assert!(matches!(
        err,
        RebalError::Broker(BrokerError::UnsupportedOrderKind(OrderKind::Limit))
    ));
    assert_eq!(terminal.terminal_calls(), 0);
}

#[tokio::test]
async fn positions_follow_continuation_pages() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    let mut scripted = ScriptedTerminal::new(tx, FillPlan::Silent);
    scripted.position_pages = vec![
        vec![("A069500", "10"), ("A229200", "5")],
        vec![("A360750", "7")],
    ];
    scripted.cash = "1000000";
    let terminal = Arc::new(scripted);
    let (broker_cfg, exec_cfg) = test_config(&dir, false);
    let broker = build_broker(&terminal, rx, &broker_cfg, &exec_cfg);

    let positions = broker.positions().await.expect("positions fetch");
    assert_eq!(positions.len(), 3);
    assert_eq!(positions["069500"], 10);
    assert_eq!(positions["229200"], 5);
    assert_eq!(positions["360750"], 7);

    // Two pages means two rate-limited requests.
    let holdings_requests = terminal
        .requested_trs
        .lock()
        .unwrap()
        .iter()
        .filter(|t| t.as_str() == tr::HOLDINGS)
        .count();
    assert_eq!(holdings_requests, 2);

    let cash = broker.cash().await.expect("cash fetch");
    assert_eq!(cash, dec!(1000000));
}

#[tokio::test]
async fn rejected_submission_skips_only_that_slice() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    let mut scripted = ScriptedTerminal::new(tx, FillPlan::FullAt(100));
    scripted.order_return_code = -308;
    let terminal = Arc::new(scripted);
    let (broker_cfg, exec_cfg) = test_config(&dir, false);
    let broker = build_broker(&terminal, rx, &broker_cfg, &exec_cfg);

    let report = broker
        .place_order(&OrderIntent::market("069500", 10, Side::Buy))
        .await
        .expect("intent still reports");

    // Every slice was attempted and rejected; nothing executed, nothing
    // escalated beyond the slice level.
    assert_eq!(report.outcome, ExecutionOutcome::Completed);
    assert_eq!(report.executed_qty, 0);
    assert_eq!(new_order_tickets(&terminal.sent_tickets()).len(), 3);
}

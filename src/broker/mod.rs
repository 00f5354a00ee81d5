//! Brokerage layer: the terminal-backed broker and its building blocks.

pub mod account;
pub mod correlator;
pub mod executor;
pub mod fill_log;
pub mod fills;
pub mod market_hours;
pub mod rate_limit;
pub mod session;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::{BrokerConfig, ExecutionConfig};
use crate::domain::{ExecutionReport, OrderIntent, UnfilledOrder};
use crate::error::{BrokerError, Result};
use crate::terminal::bridge::GatewayBridge;
use crate::terminal::{Continuation, OrderTicket, TerminalApi, TerminalEvent};

use account::AccountQueries;
use correlator::TrCorrelator;
use executor::OrderExecutor;
use fill_log::FillLog;
use fills::FillTracker;
use rate_limit::RateLimiter;
use session::TerminalSession;

/// Brokerage operations the engine depends on.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn connect(&self) -> Result<()>;
    async fn cash(&self) -> Result<Decimal>;
    async fn positions(&self) -> Result<BTreeMap<String, u32>>;
    async fn last_price(&self, ticker: &str) -> Result<Decimal>;
    async fn unfilled_orders(&self) -> Result<Vec<UnfilledOrder>>;
    async fn place_order(&self, intent: &OrderIntent) -> Result<ExecutionReport>;
    async fn portfolio_value(&self) -> Result<Decimal>;
}

/// Broker backed by the terminal gateway.
pub struct TerminalBroker {
    session: TerminalSession,
    executor: OrderExecutor,
    account: Arc<AccountQueries>,
    simulate: bool,
    connected: AtomicBool,
}

impl TerminalBroker {
    /// Connect the gateway bridge and assemble the full stack.
    pub async fn connect_gateway(cfg: &BrokerConfig, exec: &ExecutionConfig) -> Result<Self> {
        let (bridge, events) = GatewayBridge::connect(&cfg.gateway_addr).await?;
        Ok(Self::assemble(bridge, events, cfg, exec))
    }

    /// Simulate-mode broker with no terminal behind it. Orders walk the
    /// executor's state transitions; account queries return empty defaults.
    pub fn simulated(cfg: &BrokerConfig, exec: &ExecutionConfig) -> Self {
        let (_tx, events) = mpsc::unbounded_channel();
        let mut cfg = cfg.clone();
        cfg.simulate = true;
        Self::assemble(Arc::new(OfflineTerminal), events, &cfg, exec)
    }

    /// Wire the broker over any terminal implementation. This is the seam
    /// test suites drive scripted terminals through.
    pub fn assemble(
        terminal: Arc<dyn TerminalApi>,
        events: mpsc::UnboundedReceiver<TerminalEvent>,
        cfg: &BrokerConfig,
        exec: &ExecutionConfig,
    ) -> Self {
        let rate = Arc::new(RateLimiter::new(cfg.rate_limit_per_sec));
        let correlator = Arc::new(TrCorrelator::new(
            Arc::clone(&terminal),
            Arc::clone(&rate),
            Duration::from_secs(cfg.reply_timeout_secs),
        ));
        let tracker = Arc::new(FillTracker::new(Arc::new(FillLog::new(
            cfg.fill_log_path.clone(),
        ))));
        let session = TerminalSession::start(
            Arc::clone(&terminal),
            events,
            Arc::clone(&correlator),
            Arc::clone(&tracker),
            Duration::from_secs(cfg.login_timeout_secs),
        );
        let account = Arc::new(AccountQueries::new(
            Arc::clone(&terminal),
            Arc::clone(&correlator),
            cfg.account_no.clone(),
        ));
        let executor = OrderExecutor::new(
            terminal,
            tracker,
            rate,
            Arc::clone(&account),
            exec.clone(),
            cfg.account_no.clone(),
            cfg.simulate,
        );
        Self {
            session,
            executor,
            account,
            simulate: cfg.simulate,
            connected: AtomicBool::new(false),
        }
    }

    fn offline(&self) -> bool {
        self.simulate && !self.connected.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Broker for TerminalBroker {
    async fn connect(&self) -> Result<()> {
        match self.session.connect().await {
            Ok(()) => {
                self.connected.store(true, Ordering::Relaxed);
                Ok(())
            }
            Err(e) if self.simulate => {
                warn!("terminal unavailable, continuing in simulate mode: {e}");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn cash(&self) -> Result<Decimal> {
        if self.offline() {
            return Ok(Decimal::ZERO);
        }
        self.account.cash().await
    }

    async fn positions(&self) -> Result<BTreeMap<String, u32>> {
        if self.offline() {
            return Ok(BTreeMap::new());
        }
        self.account.positions().await
    }

    async fn last_price(&self, ticker: &str) -> Result<Decimal> {
        if self.offline() {
            return Ok(Decimal::ZERO);
        }
        self.account.last_price(ticker).await
    }

    async fn unfilled_orders(&self) -> Result<Vec<UnfilledOrder>> {
        if self.offline() {
            return Ok(Vec::new());
        }
        self.account.unfilled_orders().await
    }

    async fn place_order(&self, intent: &OrderIntent) -> Result<ExecutionReport> {
        let report = self.executor.execute(intent).await?;
        info!(
            symbol = %report.symbol,
            side = %report.side,
            requested = report.requested_qty,
            executed = report.executed_qty,
            outcome = %report.outcome,
            "order intent processed"
        );
        Ok(report)
    }

    async fn portfolio_value(&self) -> Result<Decimal> {
        if self.offline() {
            return Ok(Decimal::ZERO);
        }
        self.account.portfolio_value().await
    }
}

/// Stand-in terminal for simulate mode. Every call fails; simulate-mode
/// code paths never reach it.
struct OfflineTerminal;

#[async_trait]
impl TerminalApi for OfflineTerminal {
    async fn begin_connect(&self) -> Result<()> {
        Err(BrokerError::Transport("simulate mode has no terminal".to_string()).into())
    }

    async fn set_input(&self, _key: &str, _value: &str) -> Result<()> {
        Err(BrokerError::Transport("simulate mode has no terminal".to_string()).into())
    }

    async fn request(
        &self,
        _rq_name: &str,
        _tr_code: &str,
        _continuation: Continuation,
        _screen: &str,
    ) -> Result<()> {
        Err(BrokerError::Transport("simulate mode has no terminal".to_string()).into())
    }

    async fn send_order(&self, _ticket: &OrderTicket) -> Result<i32> {
        Err(BrokerError::Transport("simulate mode has no terminal".to_string()).into())
    }

    async fn field(&self, _t: &str, _r: &str, _row: usize, _name: &str) -> Result<String> {
        Err(BrokerError::Transport("simulate mode has no terminal".to_string()).into())
    }

    async fn row_count(&self, _t: &str, _r: &str) -> Result<usize> {
        Err(BrokerError::Transport("simulate mode has no terminal".to_string()).into())
    }
}

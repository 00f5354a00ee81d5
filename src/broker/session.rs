//! Terminal session: login handshake and inbound event dispatch.
//!
//! Owns the one logical connection to the terminal. A single spawned task
//! drains the terminal's event stream and routes each event to the
//! component waiting on it: connect results to the login waiter, TR data
//! to the correlator, execution events to the fill tracker.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::broker::correlator::TrCorrelator;
use crate::broker::fills::FillTracker;
use crate::error::{BrokerError, Result};
use crate::terminal::{TerminalApi, TerminalEvent};

type LoginSlot = Arc<Mutex<Option<oneshot::Sender<i32>>>>;

pub struct TerminalSession {
    terminal: Arc<dyn TerminalApi>,
    login: LoginSlot,
    login_timeout: Duration,
}

impl TerminalSession {
    /// Wire the event stream to its consumers and start dispatching.
    pub fn start(
        terminal: Arc<dyn TerminalApi>,
        events: mpsc::UnboundedReceiver<TerminalEvent>,
        correlator: Arc<TrCorrelator>,
        tracker: Arc<FillTracker>,
        login_timeout: Duration,
    ) -> Self {
        let login: LoginSlot = Arc::new(Mutex::new(None));
        tokio::spawn(dispatch(events, correlator, tracker, Arc::clone(&login)));
        Self {
            terminal,
            login,
            login_timeout,
        }
    }

    /// Run the login handshake, blocking until the terminal reports the
    /// result. A non-zero code, a timeout, or a dead event stream all fail
    /// the connection.
    pub async fn connect(&self) -> Result<()> {
        let rx = {
            let (tx, rx) = oneshot::channel();
            let mut slot = self.login.lock().expect("login lock");
            *slot = Some(tx);
            rx
        };

        self.terminal.begin_connect().await?;

        match tokio::time::timeout(self.login_timeout, rx).await {
            Ok(Ok(0)) => {
                info!("terminal login succeeded");
                Ok(())
            }
            Ok(Ok(code)) => Err(BrokerError::Connection { code }.into()),
            Ok(Err(_)) => {
                warn!("event stream ended before login completed");
                Err(BrokerError::Connection { code: -1 }.into())
            }
            Err(_) => {
                self.login.lock().expect("login lock").take();
                warn!("terminal login timed out");
                Err(BrokerError::Connection { code: -1 }.into())
            }
        }
    }
}

async fn dispatch(
    mut events: mpsc::UnboundedReceiver<TerminalEvent>,
    correlator: Arc<TrCorrelator>,
    tracker: Arc<FillTracker>,
    login: LoginSlot,
) {
    while let Some(event) = events.recv().await {
        match event {
            TerminalEvent::Connect { code } => {
                let waiter = login.lock().expect("login lock").take();
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(code);
                    }
                    None => warn!(code, "connect event with no login in progress"),
                }
            }
            TerminalEvent::TrData(reply) => correlator.complete(reply),
            TerminalEvent::Execution(notice) => tracker.on_execution(&notice).await,
        }
    }
    info!("terminal event stream closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::fill_log::FillLog;
    use crate::broker::rate_limit::RateLimiter;
    use crate::error::RebalError;
    use crate::terminal::{Continuation, OrderTicket};
    use async_trait::async_trait;

    struct NullTerminal;

    #[async_trait]
    impl TerminalApi for NullTerminal {
        async fn begin_connect(&self) -> Result<()> {
            Ok(())
        }
        async fn set_input(&self, _key: &str, _value: &str) -> Result<()> {
            Ok(())
        }
        async fn request(
            &self,
            _rq_name: &str,
            _tr_code: &str,
            _continuation: Continuation,
            _screen: &str,
        ) -> Result<()> {
            Ok(())
        }
        async fn send_order(&self, _ticket: &OrderTicket) -> Result<i32> {
            Ok(0)
        }
        async fn field(&self, _t: &str, _r: &str, _row: usize, _name: &str) -> Result<String> {
            Ok(String::new())
        }
        async fn row_count(&self, _t: &str, _r: &str) -> Result<usize> {
            Ok(0)
        }
    }

    fn session(
        events: mpsc::UnboundedReceiver<TerminalEvent>,
        timeout: Duration,
    ) -> TerminalSession {
        let terminal: Arc<dyn TerminalApi> = Arc::new(NullTerminal);
        let rate = Arc::new(RateLimiter::new(100));
        let correlator = Arc::new(TrCorrelator::new(
            Arc::clone(&terminal),
            rate,
            Duration::from_secs(1),
        ));
        let dir = std::env::temp_dir().join(format!("rebal-session-{}", uuid::Uuid::new_v4()));
        let tracker = Arc::new(FillTracker::new(Arc::new(FillLog::new(
            dir.join("fills.jsonl"),
        ))));
        TerminalSession::start(terminal, events, correlator, tracker, timeout)
    }

    #[tokio::test]
    async fn successful_login_resolves_connect() {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = session(rx, Duration::from_secs(1));

        let connect = tokio::spawn(async move { session.connect().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(TerminalEvent::Connect { code: 0 }).unwrap();

        connect.await.expect("task").expect("login succeeds");
    }

    #[tokio::test]
    async fn nonzero_login_code_is_a_connection_error() {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = session(rx, Duration::from_secs(1));

        let connect = tokio::spawn(async move { session.connect().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(TerminalEvent::Connect { code: -106 }).unwrap();

        let err = connect.await.expect("task").expect_err("login fails");
        assert!(matches!(
            err,
            RebalError::Broker(BrokerError::Connection { code: -106 })
        ));
    }

    #[tokio::test]
    async fn login_timeout_is_a_connection_error() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let session = session(rx, Duration::from_millis(50));
        let err = session.connect().await.expect_err("login times out");
        assert!(matches!(
            err,
            RebalError::Broker(BrokerError::Connection { .. })
        ));
    }
}

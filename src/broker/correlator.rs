//! TR request/response correlation.
//!
//! The terminal answers named requests through a callback on its own
//! dispatch thread. This module turns that into a blocking call/response
//! pattern: install a oneshot waiter, issue the call, suspend until the
//! data-ready event resolves it. The terminal is a single logical channel,
//! so at most one request may ever be outstanding; a second concurrent
//! request is a programming error, not a queueing situation.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::broker::rate_limit::RateLimiter;
use crate::error::{BrokerError, Result};
use crate::terminal::{Continuation, TerminalApi, TrReply};

pub struct TrCorrelator {
    terminal: Arc<dyn TerminalApi>,
    rate: Arc<RateLimiter>,
    pending: Mutex<Option<oneshot::Sender<TrReply>>>,
    reply_timeout: Duration,
}

impl TrCorrelator {
    pub fn new(
        terminal: Arc<dyn TerminalApi>,
        rate: Arc<RateLimiter>,
        reply_timeout: Duration,
    ) -> Self {
        Self {
            terminal,
            rate,
            pending: Mutex::new(None),
            reply_timeout,
        }
    }

    /// Stage `inputs`, issue the named request, and suspend until the
    /// matching data-ready event arrives.
    ///
    /// Each call acquires the rate limiter, including every page of a
    /// continued query. Timeouts and double-outstanding requests surface as
    /// [`BrokerError::Protocol`].
    pub async fn request(
        &self,
        inputs: &[(&str, &str)],
        rq_name: &str,
        tr_code: &str,
        continuation: Continuation,
        screen: &str,
    ) -> Result<TrReply> {
        let rx = self.install_waiter(rq_name)?;

        self.rate.acquire().await;

        for (key, value) in inputs {
            if let Err(e) = self.terminal.set_input(key, value).await {
                self.clear_waiter();
                return Err(e);
            }
        }
        if let Err(e) = self
            .terminal
            .request(rq_name, tr_code, continuation, screen)
            .await
        {
            self.clear_waiter();
            return Err(e);
        }

        match tokio::time::timeout(self.reply_timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => {
                self.clear_waiter();
                Err(BrokerError::Protocol(format!(
                    "terminal delivered no reply for {rq_name}"
                ))
                .into())
            }
            Err(_) => {
                self.clear_waiter();
                Err(BrokerError::Protocol(format!(
                    "timed out waiting for terminal reply to {rq_name}"
                ))
                .into())
            }
        }
    }

    /// Resolve the outstanding request with a data-ready reply. Called from
    /// the session's event dispatch; replies with no waiter (late arrivals
    /// after a timeout, unsolicited pushes) are dropped.
    pub(crate) fn complete(&self, reply: TrReply) {
        let sender = self.pending.lock().expect("correlator lock").take();
        match sender {
            Some(tx) => {
                if tx.send(reply).is_err() {
                    debug!("TR waiter gone before reply delivery");
                }
            }
            None => warn!(
                rq_name = %reply.rq_name,
                "unsolicited TR reply dropped"
            ),
        }
    }

    fn install_waiter(&self, rq_name: &str) -> Result<oneshot::Receiver<TrReply>> {
        let mut pending = self.pending.lock().expect("correlator lock");
        if pending.is_some() {
            return Err(BrokerError::Protocol(format!(
                "request already in flight when issuing {rq_name}"
            ))
            .into());
        }
        let (tx, rx) = oneshot::channel();
        *pending = Some(tx);
        Ok(rx)
    }

    fn clear_waiter(&self) {
        self.pending.lock().expect("correlator lock").take();
    }
}

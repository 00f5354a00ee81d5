//! TCP bridge to the local terminal gateway.
//!
//! The vendor control only runs inside its own host process, so trading
//! hosts run a small gateway that wraps it and speaks newline-delimited
//! JSON on localhost. Every outbound command carries a numeric `id` and is
//! answered with a tagged ack; callback traffic (login result, TR data
//! ready, execution events) arrives as untagged `event` lines and is
//! forwarded to the session's event channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};

use super::{Continuation, ExecutionNotice, OrderTicket, TerminalApi, TerminalEvent, TrReply};
use crate::domain::Side;
use crate::error::{BrokerError, Result};

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum GatewayCommand<'a> {
    Connect,
    SetInput {
        key: &'a str,
        value: &'a str,
    },
    Request {
        rq_name: &'a str,
        tr_code: &'a str,
        prev_next: &'a str,
        screen: &'a str,
    },
    SendOrder {
        ticket: &'a OrderTicket,
    },
    Field {
        tr_code: &'a str,
        rq_name: &'a str,
        row: usize,
        name: &'a str,
    },
    RowCount {
        tr_code: &'a str,
        record_name: &'a str,
    },
}

#[derive(Serialize)]
struct Envelope<'a> {
    id: u64,
    #[serde(flatten)]
    cmd: GatewayCommand<'a>,
}

#[derive(Debug, Deserialize)]
struct Ack {
    id: u64,
    #[serde(default)]
    code: Option<i32>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    count: Option<usize>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Inbound {
    Ack(Ack),
    Event(EventLine),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum EventLine {
    Connect {
        code: i32,
    },
    TrData {
        rq_name: String,
        tr_code: String,
        record_name: String,
        prev_next: String,
    },
    /// Raw execution callback. Quantity, price and side come through as the
    /// terminal's field strings; unparseable events are dropped.
    Execution {
        symbol: String,
        filled_qty: String,
        fill_price: String,
        side: String,
        complete: bool,
    },
}

type PendingAcks = Arc<Mutex<HashMap<u64, oneshot::Sender<Ack>>>>;

/// Terminal gateway client. Cheap to share behind an `Arc`.
pub struct GatewayBridge {
    writer: Mutex<OwnedWriteHalf>,
    pending: PendingAcks,
    next_id: AtomicU64,
}

impl GatewayBridge {
    /// Connect to the gateway and spawn the inbound reader. Returns the
    /// bridge plus the terminal event stream for the session to consume.
    pub async fn connect(
        addr: &str,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<TerminalEvent>)> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| BrokerError::Transport(format!("gateway connect {addr}: {e}")))?;
        let (read_half, write_half) = stream.into_split();

        let pending: PendingAcks = Arc::new(Mutex::new(HashMap::new()));
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        tokio::spawn(read_loop(read_half, Arc::clone(&pending), event_tx));

        let bridge = Arc::new(Self {
            writer: Mutex::new(write_half),
            pending,
            next_id: AtomicU64::new(1),
        });
        Ok((bridge, event_rx))
    }

    async fn roundtrip(&self, cmd: GatewayCommand<'_>) -> Result<Ack> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let mut line = serde_json::to_string(&Envelope { id, cmd })?;
        line.push('\n');
        {
            let mut writer = self.writer.lock().await;
            writer
                .write_all(line.as_bytes())
                .await
                .map_err(|e| BrokerError::Transport(format!("gateway write: {e}")))?;
        }

        let mut ack = rx
            .await
            .map_err(|_| BrokerError::Transport("gateway connection closed".to_string()))?;
        if let Some(err) = ack.error.take() {
            return Err(BrokerError::Transport(err).into());
        }
        Ok(ack)
    }
}

#[async_trait]
impl TerminalApi for GatewayBridge {
    async fn begin_connect(&self) -> Result<()> {
        self.roundtrip(GatewayCommand::Connect).await?;
        Ok(())
    }

    async fn set_input(&self, key: &str, value: &str) -> Result<()> {
        self.roundtrip(GatewayCommand::SetInput { key, value })
            .await?;
        Ok(())
    }

    async fn request(
        &self,
        rq_name: &str,
        tr_code: &str,
        continuation: Continuation,
        screen: &str,
    ) -> Result<()> {
        self.roundtrip(GatewayCommand::Request {
            rq_name,
            tr_code,
            prev_next: continuation.as_flag(),
            screen,
        })
        .await?;
        Ok(())
    }

    async fn send_order(&self, ticket: &OrderTicket) -> Result<i32> {
        let ack = self.roundtrip(GatewayCommand::SendOrder { ticket }).await?;
        Ok(ack.code.unwrap_or(-1))
    }

    async fn field(&self, tr_code: &str, rq_name: &str, row: usize, name: &str) -> Result<String> {
        let ack = self
            .roundtrip(GatewayCommand::Field {
                tr_code,
                rq_name,
                row,
                name,
            })
            .await?;
        Ok(ack.value.unwrap_or_default())
    }

    async fn row_count(&self, tr_code: &str, record_name: &str) -> Result<usize> {
        let ack = self
            .roundtrip(GatewayCommand::RowCount {
                tr_code,
                record_name,
            })
            .await?;
        Ok(ack.count.unwrap_or(0))
    }
}

async fn read_loop(
    read_half: OwnedReadHalf,
    pending: PendingAcks,
    event_tx: mpsc::UnboundedSender<TerminalEvent>,
) {
    let mut lines = BufReader::new(read_half).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("gateway closed the connection");
                break;
            }
            Err(e) => {
                warn!("gateway read error: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Inbound>(&line) {
            Ok(Inbound::Ack(ack)) => {
                if let Some(tx) = pending.lock().await.remove(&ack.id) {
                    let _ = tx.send(ack);
                } else {
                    warn!("gateway ack for unknown id {}", ack.id);
                }
            }
            Ok(Inbound::Event(event)) => {
                let mapped = match map_event(event) {
                    Some(ev) => ev,
                    None => continue,
                };
                if event_tx.send(mapped).is_err() {
                    break;
                }
            }
            Err(e) => warn!("uninterpretable gateway line ({e}): {line}"),
        }
    }
    // Release any waiters so calls fail fast instead of hanging.
    pending.lock().await.clear();
}

fn map_event(event: EventLine) -> Option<TerminalEvent> {
    match event {
        EventLine::Connect { code } => Some(TerminalEvent::Connect { code }),
        EventLine::TrData {
            rq_name,
            tr_code,
            record_name,
            prev_next,
        } => Some(TerminalEvent::TrData(TrReply {
            rq_name,
            tr_code,
            record_name,
            continuation: Continuation::from_flag(&prev_next),
        })),
        EventLine::Execution {
            symbol,
            filled_qty,
            fill_price,
            side,
            complete,
        } => {
            let qty: i64 = match filled_qty.trim().parse() {
                Ok(q) => q,
                Err(_) => {
                    warn!("execution event with bad quantity {filled_qty:?}; dropped");
                    return None;
                }
            };
            let price: i64 = match fill_price.trim().parse() {
                Ok(p) => p,
                Err(_) => {
                    warn!("execution event with bad price {fill_price:?}; dropped");
                    return None;
                }
            };
            // Vendor side codes: 1 = sell, 2 = buy.
            let side = match side.trim() {
                "2" => Side::Buy,
                "1" => Side::Sell,
                other => {
                    warn!("execution event with unknown side code {other:?}; dropped");
                    return None;
                }
            };
            Some(TerminalEvent::Execution(ExecutionNotice {
                symbol: crate::domain::normalize_symbol(&symbol),
                filled_qty: qty.unsigned_abs().min(u32::MAX as u64) as u32,
                fill_price: Decimal::from(price.abs()),
                side,
                complete,
            }))
        }
    }
}

//! Execution event tracking.
//!
//! The terminal streams execution ("chejan") events on its own dispatch
//! thread. While a slice is armed, matching events accumulate into its
//! [`ExecutionSnapshot`]; everything else is logged but never attributed.
//! Every positive fill is appended to the durable fill log regardless of
//! attribution: the log is the audit trail, the snapshot is trading state.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::broker::fill_log::FillLog;
use crate::domain::{ExecutionSnapshot, FillEvent};
use crate::terminal::ExecutionNotice;

struct ActiveSlice {
    symbol: String,
    target_qty: u32,
    snapshot: ExecutionSnapshot,
    done_tx: Option<oneshot::Sender<()>>,
}

pub struct FillTracker {
    log: Arc<FillLog>,
    active: Mutex<Option<ActiveSlice>>,
}

impl FillTracker {
    pub fn new(log: Arc<FillLog>) -> Self {
        Self {
            log,
            active: Mutex::new(None),
        }
    }

    /// Arm tracking for one slice. Resets the snapshot and returns the
    /// receiver released when the slice is done. Arming replaces any
    /// previously armed slice.
    pub fn arm(&self, symbol: &str, target_qty: u32) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let mut active = self.active.lock().expect("fill tracker lock");
        if active.is_some() {
            warn!(symbol, "arming over a still-armed slice; previous slice abandoned");
        }
        *active = Some(ActiveSlice {
            symbol: symbol.to_string(),
            target_qty,
            snapshot: ExecutionSnapshot::default(),
            done_tx: Some(tx),
        });
        rx
    }

    /// Stop tracking and take the snapshot accumulated so far.
    pub fn disarm(&self) -> ExecutionSnapshot {
        self.active
            .lock()
            .expect("fill tracker lock")
            .take()
            .map(|slice| slice.snapshot)
            .unwrap_or_default()
    }

    /// Consume one execution event from the terminal.
    pub async fn on_execution(&self, notice: &ExecutionNotice) {
        if notice.filled_qty > 0 {
            let event = FillEvent {
                timestamp: Utc::now(),
                symbol: notice.symbol.clone(),
                quantity: notice.filled_qty,
                price: notice.fill_price,
                side: notice.side,
            };
            // Best effort: the terminal's callbacks stay authoritative for
            // trading state even if the log write fails.
            if let Err(e) = self.log.append(&event).await {
                warn!(symbol = %notice.symbol, "fill log write failed: {e}");
            }
        }

        let mut active = self.active.lock().expect("fill tracker lock");
        let slice = match active.as_mut() {
            Some(slice) if slice.symbol == notice.symbol => slice,
            Some(slice) => {
                debug!(
                    armed = %slice.symbol,
                    got = %notice.symbol,
                    "execution event for another symbol; not attributed"
                );
                return;
            }
            None => {
                debug!(symbol = %notice.symbol, "execution event with no armed slice");
                return;
            }
        };

        slice.snapshot.apply_fill(notice.filled_qty, notice.fill_price);

        // An over-report beyond the armed quantity is a data anomaly; treat
        // the slice as fully filled rather than accumulating further risk.
        let filled_out = slice.snapshot.filled_qty >= slice.target_qty;
        if notice.complete || filled_out {
            slice.snapshot.done = true;
            if let Some(tx) = slice.done_tx.take() {
                let _ = tx.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Side;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn tracker(dir: &tempfile::TempDir) -> FillTracker {
        FillTracker::new(Arc::new(FillLog::new(dir.path().join("fills.jsonl"))))
    }

    fn notice(symbol: &str, qty: u32, price: Decimal, complete: bool) -> ExecutionNotice {
        ExecutionNotice {
            symbol: symbol.to_string(),
            filled_qty: qty,
            fill_price: price,
            side: Side::Buy,
            complete,
        }
    }

    #[tokio::test]
    async fn accumulates_vwap_across_partial_fills() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = tracker(&dir);

        let _rx = tracker.arm("069500", 5);
        tracker.on_execution(&notice("069500", 3, dec!(100), false)).await;
        tracker.on_execution(&notice("069500", 2, dec!(106), false)).await;

        let snap = tracker.disarm();
        assert_eq!(snap.filled_qty, 5);
        assert_eq!(snap.avg_fill_price, dec!(102.4));
    }

    #[tokio::test]
    async fn complete_status_releases_the_waiter() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = tracker(&dir);

        let rx = tracker.arm("069500", 10);
        tracker.on_execution(&notice("069500", 4, dec!(100), true)).await;

        rx.await.expect("done signal");
        let snap = tracker.disarm();
        assert!(snap.done);
        assert_eq!(snap.filled_qty, 4);
    }

    #[tokio::test]
    async fn overfill_marks_the_slice_done() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = tracker(&dir);

        let rx = tracker.arm("069500", 3);
        // Terminal reports more than the armed quantity without a complete flag.
        tracker.on_execution(&notice("069500", 5, dec!(100), false)).await;

        rx.await.expect("done signal");
        assert!(tracker.disarm().done);
    }

    #[tokio::test]
    async fn other_symbols_are_logged_but_not_attributed() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = tracker(&dir);
        let log = Arc::new(FillLog::new(dir.path().join("fills.jsonl")));

        let _rx = tracker.arm("069500", 5);
        tracker.on_execution(&notice("229200", 2, dec!(9000), false)).await;

        let snap = tracker.disarm();
        assert_eq!(snap.filled_qty, 0);

        let events = log.read_all().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].symbol, "229200");
    }

    #[tokio::test]
    async fn events_with_no_armed_slice_still_reach_the_log() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = tracker(&dir);
        let log = FillLog::new(dir.path().join("fills.jsonl"));

        tracker.on_execution(&notice("069500", 2, dec!(35000), false)).await;

        assert_eq!(log.read_all().await.unwrap().len(), 1);
        assert_eq!(tracker.disarm(), ExecutionSnapshot::default());
    }
}

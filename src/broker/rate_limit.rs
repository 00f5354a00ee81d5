//! Outbound call throttle for the terminal.
//!
//! The vendor enforces a ceiling on requests per rolling second and
//! penalizes violations, so every outbound call path acquires this limiter
//! first.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

const WINDOW: Duration = Duration::from_secs(1);

/// Sliding one-second window limiter.
///
/// Timestamps older than the window are evicted on every acquire, so the
/// queue never holds more than `max_per_second` entries.
pub struct RateLimiter {
    max_per_second: usize,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_per_second: usize) -> Self {
        Self {
            max_per_second: max_per_second.max(1),
            calls: Mutex::new(VecDeque::new()),
        }
    }

    /// Wait until issuing one more call stays within the ceiling, then
    /// record the call.
    pub async fn acquire(&self) {
        let mut calls = self.calls.lock().await;
        let now = Instant::now();
        while let Some(&front) = calls.front() {
            if now.duration_since(front) > WINDOW {
                calls.pop_front();
            } else {
                break;
            }
        }
        if calls.len() >= self.max_per_second {
            let oldest = *calls.front().expect("queue is non-empty at capacity");
            let wake_at = oldest + WINDOW;
            tokio::time::sleep_until(wake_at).await;
            let now = Instant::now();
            while let Some(&front) = calls.front() {
                if now.duration_since(front) > WINDOW {
                    calls.pop_front();
                } else {
                    break;
                }
            }
        }
        calls.push_back(Instant::now());
    }
}

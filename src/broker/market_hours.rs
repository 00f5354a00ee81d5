//! Exchange-session gates.
//!
//! Pure predicates over the exchange-local clock (the deployment runs in
//! exchange time). Regular KRX cash session is 09:00–15:30; new orders are
//! blocked in the final ten minutes when configured.

use chrono::{Local, NaiveTime};

fn market_open() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).expect("valid time")
}

fn market_close() -> NaiveTime {
    NaiveTime::from_hms_opt(15, 30, 0).expect("valid time")
}

fn near_close_start() -> NaiveTime {
    NaiveTime::from_hms_opt(15, 20, 0).expect("valid time")
}

/// True while the regular session is open (inclusive bounds).
pub fn is_market_open(now: NaiveTime) -> bool {
    now >= market_open() && now <= market_close()
}

/// True from ten minutes before the close onward.
pub fn is_near_close(now: NaiveTime) -> bool {
    now >= near_close_start()
}

/// Current exchange-local wall clock.
pub fn exchange_now() -> NaiveTime {
    Local::now().time()
}

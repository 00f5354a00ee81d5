//! Daily close-price containers.

pub mod provider;

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::warn;

use provider::PriceProvider;

/// One ticker's daily closes, date-ascending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSeries {
    pub dates: Vec<NaiveDate>,
    pub closes: Vec<f64>,
}

impl PriceSeries {
    pub fn new(dates: Vec<NaiveDate>, closes: Vec<f64>) -> Self {
        debug_assert_eq!(dates.len(), closes.len());
        Self { dates, closes }
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    pub fn last(&self) -> Option<f64> {
        self.closes.last().copied()
    }

    pub fn push(&mut self, date: NaiveDate, close: f64) {
        self.dates.push(date);
        self.closes.push(close);
    }
}

/// Ticker -> close series.
#[derive(Debug, Clone, Default)]
pub struct PriceHistory {
    series: BTreeMap<String, PriceSeries>,
}

impl PriceHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, ticker: impl Into<String>, series: PriceSeries) {
        self.series.insert(ticker.into(), series);
    }

    pub fn get(&self, ticker: &str) -> Option<&PriceSeries> {
        self.series.get(ticker)
    }

    pub fn remove(&mut self, ticker: &str) -> Option<PriceSeries> {
        self.series.remove(ticker)
    }

    pub fn closes(&self, ticker: &str) -> Option<&[f64]> {
        self.series.get(ticker).map(|s| s.closes.as_slice())
    }

    pub fn tickers(&self) -> impl Iterator<Item = &String> {
        self.series.keys()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Absorb another history; colliding tickers keep the other's series.
    pub fn merge(&mut self, other: PriceHistory) {
        for (ticker, series) in other.series {
            self.series.insert(ticker, series);
        }
    }
}

/// Fetch a set of tickers into one history, skipping tickers whose fetch
/// fails or comes back empty.
pub async fn fetch_history(
    provider: &dyn PriceProvider,
    tickers: &[String],
    start: NaiveDate,
    end: NaiveDate,
) -> PriceHistory {
    let mut history = PriceHistory::new();
    for ticker in tickers {
        match provider.daily_closes(ticker, start, end).await {
            Ok(series) if !series.is_empty() => history.insert(ticker.clone(), series),
            Ok(_) => warn!(%ticker, "no price rows returned"),
            Err(e) => warn!(%ticker, "price fetch failed: {e}"),
        }
    }
    history
}

/// Date range ending today, spanning `lookback_years`.
pub fn lookback_range(lookback_years: u32) -> (NaiveDate, NaiveDate) {
    let end = chrono::Local::now().date_naive();
    let start = end - chrono::Duration::days(365 * i64::from(lookback_years));
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn series_accessors() {
        let mut s = PriceSeries::default();
        assert!(s.is_empty());
        s.push(d(2024, 1, 2), 100.0);
        s.push(d(2024, 1, 3), 101.5);
        assert_eq!(s.len(), 2);
        assert_eq!(s.last(), Some(101.5));
    }

    #[test]
    fn history_merge_prefers_newer_series() {
        let mut a = PriceHistory::new();
        a.insert("SPY", PriceSeries::new(vec![d(2024, 1, 2)], vec![470.0]));
        let mut b = PriceHistory::new();
        b.insert("SPY", PriceSeries::new(vec![d(2024, 1, 3)], vec![472.0]));
        b.insert("TLT", PriceSeries::new(vec![d(2024, 1, 3)], vec![98.0]));

        a.merge(b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.get("SPY").unwrap().last(), Some(472.0));
    }

    #[test]
    fn lookback_range_spans_years() {
        let (start, end) = lookback_range(2);
        assert!(end - start >= chrono::Duration::days(729));
    }
}

//! Price providers: public chart endpoint plus a CSV cache layer.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, warn};

use super::PriceSeries;
use crate::error::{RebalError, Result};

#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Daily closes for `symbol` over `[start, end]`, date-ascending.
    async fn daily_closes(&self, symbol: &str, start: NaiveDate, end: NaiveDate)
        -> Result<PriceSeries>;
}

// ---- chart endpoint ----

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    timestamp: Option<Vec<i64>>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    close: Option<Vec<Option<f64>>>,
}

/// Daily-close provider over the public Yahoo chart endpoint.
pub struct YahooProvider {
    client: reqwest::Client,
    base_url: String,
}

impl YahooProvider {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: "https://query1.finance.yahoo.com/v8/finance/chart".to_string(),
        }
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn parse_chart(symbol: &str, envelope: ChartEnvelope) -> Result<PriceSeries> {
        if let Some(err) = envelope.chart.error {
            return Err(RebalError::MarketDataUnavailable(format!(
                "{symbol}: {err}"
            )));
        }
        let result = envelope
            .chart
            .result
            .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
            .ok_or_else(|| {
                RebalError::MarketDataUnavailable(format!("{symbol}: empty chart result"))
            })?;

        let timestamps = result.timestamp.unwrap_or_default();
        let closes = result
            .indicators
            .quote
            .into_iter()
            .next()
            .and_then(|q| q.close)
            .unwrap_or_default();

        let mut series = PriceSeries::default();
        for (ts, close) in timestamps.iter().zip(closes) {
            if let (Some(dt), Some(close)) = (chrono::DateTime::from_timestamp(*ts, 0), close) {
                if close.is_finite() {
                    series.push(dt.date_naive(), close);
                }
            }
        }
        Ok(series)
    }
}

impl Default for YahooProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceProvider for YahooProvider {
    async fn daily_closes(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries> {
        let period1 = start
            .and_hms_opt(0, 0, 0)
            .expect("valid time")
            .and_utc()
            .timestamp();
        let period2 = end
            .and_hms_opt(23, 59, 59)
            .expect("valid time")
            .and_utc()
            .timestamp();
        let url = format!(
            "{}/{}?period1={}&period2={}&interval=1d",
            self.base_url, symbol, period1, period2
        );

        let envelope: ChartEnvelope = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, "rebal/0.1")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Self::parse_chart(symbol, envelope)
    }
}

// ---- CSV cache layer ----

/// Wraps a provider with a per-symbol on-disk CSV cache. Cache misses or
/// unreadable files fall through to the inner provider; cache writes are
/// best effort.
pub struct CachedProvider<P> {
    inner: P,
    cache_dir: PathBuf,
    enabled: bool,
}

impl<P: PriceProvider> CachedProvider<P> {
    pub fn new(inner: P, cache_dir: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            inner,
            cache_dir: cache_dir.into(),
            enabled,
        }
    }

    fn cache_path(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> PathBuf {
        let safe: String = symbol
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        self.cache_dir.join(format!("px_{safe}_{start}_{end}.csv"))
    }
}

fn read_cache(path: &Path) -> Result<PriceSeries> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut series = PriceSeries::default();
    for record in reader.records() {
        let record = record?;
        let date: NaiveDate = record
            .get(0)
            .unwrap_or_default()
            .parse()
            .map_err(|e| RebalError::Validation(format!("bad cache date: {e}")))?;
        let close: f64 = record
            .get(1)
            .unwrap_or_default()
            .parse()
            .map_err(|e| RebalError::Validation(format!("bad cache close: {e}")))?;
        series.push(date, close);
    }
    Ok(series)
}

fn write_cache(path: &Path, series: &PriceSeries) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["date", "close"])?;
    for (date, close) in series.dates.iter().zip(&series.closes) {
        writer.write_record([date.to_string(), close.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

#[async_trait]
impl<P: PriceProvider> PriceProvider for CachedProvider<P> {
    async fn daily_closes(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries> {
        let path = self.cache_path(symbol, start, end);
        if self.enabled && path.exists() {
            match read_cache(&path) {
                Ok(series) => {
                    debug!(%symbol, "price cache hit");
                    return Ok(series);
                }
                Err(e) => warn!(%symbol, "unreadable price cache, refetching: {e}"),
            }
        }

        let series = self.inner.daily_closes(symbol, start, end).await?;
        if self.enabled {
            if let Err(e) = write_cache(&path, &series) {
                warn!(%symbol, "price cache write failed: {e}");
            }
        }
        Ok(series)
    }
}

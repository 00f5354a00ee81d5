use thiserror::Error;

use crate::domain::OrderKind;

/// Main error type for the rebalancer
#[derive(Error, Debug)]
pub enum RebalError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    // Market data errors
    #[error("Market data unavailable: {0}")]
    MarketDataUnavailable(String),

    #[error("Not enough price history: {0}")]
    InsufficientHistory(String),

    // Brokerage errors
    #[error(transparent)]
    Broker(#[from] BrokerError),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for RebalError
pub type Result<T> = std::result::Result<T, RebalError>;

/// Specific error types for the terminal execution path.
///
/// The taxonomy matters for handling: `Connection` is fatal to a trading
/// run, `Protocol` aborts the current order intent, `Submission` aborts only
/// the slice or cancel attempt it came from. Fill-wait timeouts and slippage
/// breaches are recognized states, not errors, and never appear here.
#[derive(Error, Debug, Clone)]
pub enum BrokerError {
    #[error("terminal login failed with code {code}")]
    Connection { code: i32 },

    #[error("terminal protocol violation: {0}")]
    Protocol(String),

    #[error("order submission rejected: return code {code} for {symbol}")]
    Submission { code: i32, symbol: String },

    #[error("unsupported order kind {0}; only market orders are supported")]
    UnsupportedOrderKind(OrderKind),

    #[error("terminal transport error: {0}")]
    Transport(String),
}

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub universe: UniverseConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub regime: RegimeConfig,
    #[serde(default)]
    pub risk_cut: RiskCutConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub rebalance: RebalanceConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct UniverseConfig {
    #[serde(default)]
    pub kr: MarketUniverse,
    #[serde(default)]
    pub us: MarketUniverse,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct MarketUniverse {
    /// Tickers to score
    #[serde(default)]
    pub tickers: Vec<String>,
    /// Always included, even if absent from `tickers`
    #[serde(default)]
    pub whitelist: Vec<String>,
    /// Never included
    #[serde(default)]
    pub blacklist: Vec<String>,
}

impl MarketUniverse {
    /// Deduplicated ticker list: configured + whitelisted, minus blacklisted.
    pub fn resolve(&self) -> Vec<String> {
        let mut seen = std::collections::BTreeSet::new();
        let mut out = Vec::new();
        for t in self.tickers.iter().chain(self.whitelist.iter()) {
            if self.blacklist.contains(t) {
                continue;
            }
            if seen.insert(t.clone()) {
                out.push(t.clone());
            }
        }
        out
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    /// Years of daily history to fetch
    #[serde(default = "default_lookback_years")]
    pub lookback_years: u32,
    /// Directory for the CSV price cache
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    /// Whether to use the cache at all
    #[serde(default = "default_true")]
    pub cache_csv: bool,
}

fn default_lookback_years() -> u32 {
    3
}

fn default_cache_dir() -> String {
    ".cache".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            lookback_years: default_lookback_years(),
            cache_dir: default_cache_dir(),
            cache_csv: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectionConfig {
    #[serde(default = "default_score_weights")]
    pub score_weights: ScoreWeights,
    #[serde(default = "default_top_n_risk_on")]
    pub top_n_risk_on: usize,
    #[serde(default = "default_top_n_risk_off")]
    pub top_n_risk_off: usize,
    /// Per-ticker weight cap
    #[serde(default = "default_max_weight")]
    pub max_weight: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoreWeights {
    pub momentum: f64,
    pub trend: f64,
    pub vol_penalty: f64,
    pub dd_penalty: f64,
}

fn default_score_weights() -> ScoreWeights {
    ScoreWeights {
        momentum: 0.5,
        trend: 0.3,
        vol_penalty: 0.1,
        dd_penalty: 0.1,
    }
}

fn default_top_n_risk_on() -> usize {
    8
}

fn default_top_n_risk_off() -> usize {
    5
}

fn default_max_weight() -> f64 {
    0.25
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            score_weights: default_score_weights(),
            top_n_risk_on: default_top_n_risk_on(),
            top_n_risk_off: default_top_n_risk_off(),
            max_weight: default_max_weight(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegimeConfig {
    #[serde(default = "default_risk_on_score_min")]
    pub risk_on_score_min: f64,
    #[serde(default = "default_risk_off_score_max")]
    pub risk_off_score_max: f64,
    #[serde(default = "default_regime_weights")]
    pub weights: RegimeWeights,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegimeWeights {
    pub spy_trend: f64,
    pub usd_momentum: f64,
    pub credit: f64,
    pub vix: f64,
    pub rates: f64,
}

fn default_risk_on_score_min() -> f64 {
    0.55
}

fn default_risk_off_score_max() -> f64 {
    0.45
}

fn default_regime_weights() -> RegimeWeights {
    RegimeWeights {
        spy_trend: 0.30,
        usd_momentum: 0.15,
        credit: 0.20,
        vix: 0.20,
        rates: 0.15,
    }
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            risk_on_score_min: default_risk_on_score_min(),
            risk_off_score_max: default_risk_off_score_max(),
            weights: default_regime_weights(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskCutConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub below_200sma_cut: bool,
    /// 126-day trailing drawdown at or below this cuts the position
    #[serde(default = "default_trailing_dd_cut")]
    pub trailing_dd_cut: f64,
    /// 63-day trailing drawdown at or below this cuts the position
    #[serde(default = "default_hard_stop_cut")]
    pub hard_stop_cut: f64,
    #[serde(default = "default_true")]
    pub cut_to_cash: bool,
    /// Ticker that absorbs cut weight
    #[serde(default = "default_cash_ticker")]
    pub cash_ticker: String,
}

fn default_trailing_dd_cut() -> f64 {
    -0.12
}

fn default_hard_stop_cut() -> f64 {
    -0.18
}

fn default_cash_ticker() -> String {
    "BIL".to_string()
}

impl Default for RiskCutConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            below_200sma_cut: true,
            trailing_dd_cut: default_trailing_dd_cut(),
            hard_stop_cut: default_hard_stop_cut(),
            cut_to_cash: true,
            cash_ticker: default_cash_ticker(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Brokerage account number
    #[serde(default)]
    pub account_no: String,
    /// Terminal gateway address
    #[serde(default = "default_gateway_addr")]
    pub gateway_addr: String,
    /// Simulate mode: walk transitions, never call the terminal
    #[serde(default = "default_true")]
    pub simulate: bool,
    /// Durable fill log path
    #[serde(default = "default_fill_log_path")]
    pub fill_log_path: String,
    /// Outbound terminal call ceiling per rolling second
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_sec: usize,
    #[serde(default = "default_login_timeout")]
    pub login_timeout_secs: u64,
    /// How long to wait for a TR data-ready event
    #[serde(default = "default_reply_timeout")]
    pub reply_timeout_secs: u64,
}

fn default_gateway_addr() -> String {
    "127.0.0.1:9443".to_string()
}

fn default_fill_log_path() -> String {
    "data/fills.jsonl".to_string()
}

fn default_rate_limit() -> usize {
    5
}

fn default_login_timeout() -> u64 {
    30
}

fn default_reply_timeout() -> u64 {
    10
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            account_no: String::new(),
            gateway_addr: default_gateway_addr(),
            simulate: true,
            fill_log_path: default_fill_log_path(),
            rate_limit_per_sec: default_rate_limit(),
            login_timeout_secs: default_login_timeout(),
            reply_timeout_secs: default_reply_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Number of slices per order intent
    #[serde(default = "default_split_count")]
    pub split_count: u32,
    /// Slippage circuit breaker in basis points
    #[serde(default = "default_slippage_limit_bps")]
    pub slippage_limit_bps: Decimal,
    #[serde(default = "default_true")]
    pub require_market_open: bool,
    #[serde(default = "default_true")]
    pub block_near_close: bool,
    /// Seconds to wait for a slice to fill
    #[serde(default = "default_fill_wait")]
    pub fill_wait_secs: u64,
    /// Pause between slices
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Pause between a cancel and its reorder
    #[serde(default = "default_reorder_pause_ms")]
    pub reorder_pause_ms: u64,
}

fn default_split_count() -> u32 {
    3
}

fn default_slippage_limit_bps() -> Decimal {
    Decimal::from(30)
}

fn default_fill_wait() -> u64 {
    20
}

fn default_settle_ms() -> u64 {
    300
}

fn default_reorder_pause_ms() -> u64 {
    1000
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            split_count: default_split_count(),
            slippage_limit_bps: default_slippage_limit_bps(),
            require_market_open: true,
            block_near_close: true,
            fill_wait_secs: default_fill_wait(),
            settle_ms: default_settle_ms(),
            reorder_pause_ms: default_reorder_pause_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RebalanceConfig {
    /// Skip trades below this notional value
    #[serde(default = "default_min_trade_value")]
    pub min_trade_value: Decimal,
}

fn default_min_trade_value() -> Decimal {
    Decimal::from(100_000)
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            min_trade_value: default_min_trade_value(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_weekly_job")]
    pub report_weekly: WeeklyJob,
    #[serde(default = "default_daily_job")]
    pub risk_check_daily: DailyJob,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeeklyJob {
    /// Lowercase three-letter weekday (mon..sun)
    pub day_of_week: String,
    pub hour: u32,
    pub minute: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DailyJob {
    pub hour: u32,
    pub minute: u32,
}

fn default_weekly_job() -> WeeklyJob {
    WeeklyJob {
        day_of_week: "mon".to_string(),
        hour: 8,
        minute: 30,
    }
}

fn default_daily_job() -> DailyJob {
    DailyJob {
        hour: 8,
        minute: 40,
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            report_weekly: default_weekly_job(),
            risk_check_daily: default_daily_job(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct NotifierConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Environment variable holding the bot token
    #[serde(default = "default_bot_token_env")]
    pub bot_token_env: String,
    /// Environment variable holding the chat id
    #[serde(default = "default_chat_id_env")]
    pub chat_id_env: String,
}

fn default_bot_token_env() -> String {
    "TELEGRAM_BOT_TOKEN".to_string()
}

fn default_chat_id_env() -> String {
    "TELEGRAM_CHAT_ID".to_string()
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token_env: default_bot_token_env(),
            chat_id_env: default_chat_id_env(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_out_dir")]
    pub out_dir: String,
}

fn default_out_dir() -> String {
    "output".to_string()
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            out_dir: default_out_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// When set, also write daily-rolling log files here
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("REBAL_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (REBAL_BROKER__ACCOUNT_NO, etc.)
            .add_source(
                Environment::with_prefix("REBAL")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.execution.split_count == 0 {
            errors.push("execution.split_count must be at least 1".to_string());
        }
        if self.execution.slippage_limit_bps < Decimal::ZERO {
            errors.push("execution.slippage_limit_bps must be non-negative".to_string());
        }
        if self.execution.fill_wait_secs == 0 {
            errors.push("execution.fill_wait_secs must be positive".to_string());
        }
        if self.broker.rate_limit_per_sec == 0 {
            errors.push("broker.rate_limit_per_sec must be at least 1".to_string());
        }
        if !self.broker.simulate && self.broker.account_no.trim().is_empty() {
            errors.push("broker.account_no is required outside simulate mode".to_string());
        }
        if self.regime.risk_on_score_min <= self.regime.risk_off_score_max {
            errors.push(
                "regime.risk_on_score_min must exceed regime.risk_off_score_max".to_string(),
            );
        }
        if !(0.0 < self.selection.max_weight && self.selection.max_weight <= 1.0) {
            errors.push("selection.max_weight must be in (0, 1]".to_string());
        }
        if self.selection.top_n_risk_on == 0 || self.selection.top_n_risk_off == 0 {
            errors.push("selection top_n values must be at least 1".to_string());
        }
        if self.data.lookback_years == 0 {
            errors.push("data.lookback_years must be at least 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            universe: UniverseConfig::default(),
            data: DataConfig::default(),
            selection: SelectionConfig::default(),
            regime: RegimeConfig::default(),
            risk_cut: RiskCutConfig::default(),
            broker: BrokerConfig::default(),
            execution: ExecutionConfig::default(),
            rebalance: RebalanceConfig::default(),
            schedule: ScheduleConfig::default(),
            notifier: NotifierConfig::default(),
            report: ReportConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = AppConfig::default();
        cfg.validate().expect("default config is valid");
    }

    #[test]
    fn live_mode_requires_account() {
        let mut cfg = AppConfig::default();
        cfg.broker.simulate = false;
        let errors = cfg.validate().expect_err("missing account must fail");
        assert!(errors.iter().any(|e| e.contains("account_no")));
    }

    #[test]
    fn inverted_regime_thresholds_fail() {
        let mut cfg = AppConfig::default();
        cfg.regime.risk_on_score_min = 0.4;
        cfg.regime.risk_off_score_max = 0.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn universe_resolution_applies_white_and_blacklist() {
        let universe = MarketUniverse {
            tickers: vec!["069500.KS".into(), "229200.KS".into()],
            whitelist: vec!["360750.KS".into(), "069500.KS".into()],
            blacklist: vec!["229200.KS".into()],
        };
        assert_eq!(
            universe.resolve(),
            vec!["069500.KS".to_string(), "360750.KS".to_string()]
        );
    }
}

use clap::Parser;
use rebal::broker::{Broker, TerminalBroker};
use rebal::cli::{Cli, Commands};
use rebal::config::{AppConfig, LoggingConfig};
use rebal::data::provider::{CachedProvider, YahooProvider};
use rebal::error::{RebalError, Result};
use rebal::notifier::TelegramNotifier;
use rebal::{engine, scheduler};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut cfg = AppConfig::load_from(&cli.config)?;

    if matches!(&cli.command, Commands::Trade { live: true }) {
        cfg.broker.simulate = false;
    }

    let _log_guard = init_logging(&cfg.logging);

    if let Err(errors) = cfg.validate() {
        return Err(RebalError::Validation(errors.join("; ")));
    }

    let provider = CachedProvider::new(
        YahooProvider::new(),
        cfg.data.cache_dir.clone(),
        cfg.data.cache_csv,
    );
    let notifier = TelegramNotifier::from_config(&cfg.notifier.telegram);

    match cli.command {
        Commands::Report => {
            let summary = engine::run_once(&cfg, &provider, &notifier).await?;
            println!(
                "{} score={:.2} report={}",
                summary.regime.state,
                summary.regime.risk_score,
                summary.report_path.display()
            );
        }
        Commands::Trade { .. } => {
            let summary = engine::run_once(&cfg, &provider, &notifier).await?;
            let broker = build_broker(&cfg).await?;
            let reports = engine::execute_rebalance(
                &cfg,
                &broker,
                &summary.final_weights,
                summary.regime.vix_spike,
            )
            .await?;

            for report in &reports {
                println!(
                    "{} {} {}/{} @ {} [{}]",
                    report.side,
                    report.symbol,
                    report.executed_qty,
                    report.requested_qty,
                    report
                        .avg_price
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    report.outcome
                );
            }
            info!(intents = reports.len(), "rebalance finished");
        }
        Commands::Account => {
            let broker = build_broker(&cfg).await?;
            broker.connect().await?;
            let cash = broker.cash().await?;
            let positions = broker.positions().await?;
            println!("cash: {cash}");
            for (symbol, qty) in &positions {
                let price = broker.last_price(symbol).await?;
                println!("  {symbol}: {qty} @ {price}");
            }
            println!("portfolio value: {}", broker.portfolio_value().await?);
        }
        Commands::Schedule => {
            scheduler::run(&cfg, &provider, &notifier).await?;
        }
    }

    Ok(())
}

async fn build_broker(cfg: &AppConfig) -> Result<TerminalBroker> {
    if cfg.broker.simulate {
        info!("simulate mode: orders are logged, not sent");
        Ok(TerminalBroker::simulated(&cfg.broker, &cfg.execution))
    } else {
        TerminalBroker::connect_gateway(&cfg.broker, &cfg.execution).await
    }
}

fn init_logging(cfg: &LoggingConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));
    match &cfg.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "rebal.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "rebal")]
#[command(version = "0.1.0")]
#[command(about = "Regime-aware ETF rebalancer with brokerage terminal execution", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config directory
    #[arg(short, long, default_value = "config")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Score the universe, allocate weights and write a report (no trading)
    Report,
    /// Run a rebalance and submit the resulting orders
    Trade {
        /// Submit real orders through the terminal gateway
        #[arg(long)]
        live: bool,
    },
    /// Show account cash, positions and portfolio value
    Account,
    /// Start the weekly-report / daily-risk-check scheduler
    Schedule,
}

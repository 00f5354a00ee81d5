//! Cron-style job loop.
//!
//! Two jobs on the local clock: a weekly report and a daily risk check,
//! both running the engine in report-only mode. The loop ticks every 30
//! seconds and latches each job to at most one firing per calendar day.

use chrono::{Datelike, Local, NaiveDate, Weekday};
use tracing::{error, info};

use crate::config::AppConfig;
use crate::data::provider::PriceProvider;
use crate::engine;
use crate::error::Result;
use crate::notifier::TelegramNotifier;

const TICK_SECS: u64 = 30;

fn parse_weekday(raw: &str) -> Option<Weekday> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "mon" => Some(Weekday::Mon),
        "tue" => Some(Weekday::Tue),
        "wed" => Some(Weekday::Wed),
        "thu" => Some(Weekday::Thu),
        "fri" => Some(Weekday::Fri),
        "sat" => Some(Weekday::Sat),
        "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

struct JobState {
    last_fired: Option<NaiveDate>,
}

impl JobState {
    fn new() -> Self {
        Self { last_fired: None }
    }

    fn due(&mut self, today: NaiveDate, matches: bool) -> bool {
        if !matches || self.last_fired == Some(today) {
            return false;
        }
        self.last_fired = Some(today);
        true
    }
}

/// Run the scheduler until Ctrl-C.
pub async fn run(
    cfg: &AppConfig,
    provider: &dyn PriceProvider,
    notifier: &TelegramNotifier,
) -> Result<()> {
    let weekly_day = parse_weekday(&cfg.schedule.report_weekly.day_of_week)
        .unwrap_or(Weekday::Mon);
    info!(
        weekly = %format!(
            "{} {:02}:{:02}",
            cfg.schedule.report_weekly.day_of_week,
            cfg.schedule.report_weekly.hour,
            cfg.schedule.report_weekly.minute
        ),
        daily = %format!(
            "{:02}:{:02}",
            cfg.schedule.risk_check_daily.hour, cfg.schedule.risk_check_daily.minute
        ),
        "scheduler started"
    );

    let mut weekly = JobState::new();
    let mut daily = JobState::new();
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(TICK_SECS));

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("scheduler stopping");
                return Ok(());
            }
        }

        let now = Local::now();
        let today = now.date_naive();

        let weekly_due = weekly.due(
            today,
            now.weekday() == weekly_day
                && past_time(
                    now.time(),
                    cfg.schedule.report_weekly.hour,
                    cfg.schedule.report_weekly.minute,
                ),
        );
        if weekly_due {
            info!("weekly report job firing");
            if let Err(e) = engine::run_once(cfg, provider, notifier).await {
                error!("weekly report failed: {e}");
            }
        }

        let daily_due = daily.due(
            today,
            past_time(
                now.time(),
                cfg.schedule.risk_check_daily.hour,
                cfg.schedule.risk_check_daily.minute,
            ),
        );
        if daily_due {
            info!("daily risk check firing");
            if let Err(e) = engine::run_once(cfg, provider, notifier).await {
                error!("daily risk check failed: {e}");
            }
        }
    }
}

fn past_time(now: chrono::NaiveTime, hour: u32, minute: u32) -> bool {
    let target = chrono::NaiveTime::from_hms_opt(hour.min(23), minute.min(59), 0)
        .unwrap_or_default();
    now >= target
}

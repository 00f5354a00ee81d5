//! Telegram notifications.
//!
//! Sends run summaries to a Telegram chat. Credentials come from the
//! environment variables named in config; a missing credential or a failed
//! send is logged and swallowed so notification can never break a run.

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::TelegramConfig;

#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    token: Option<String>,
    chat_id: Option<String>,
    enabled: bool,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

impl TelegramNotifier {
    pub fn from_config(cfg: &TelegramConfig) -> Self {
        let token = std::env::var(&cfg.bot_token_env).ok().filter(|s| !s.is_empty());
        let chat_id = std::env::var(&cfg.chat_id_env).ok().filter(|s| !s.is_empty());
        if cfg.enabled && (token.is_none() || chat_id.is_none()) {
            warn!("telegram notifier enabled but credentials are missing");
        }
        Self {
            client: Client::new(),
            token,
            chat_id,
            enabled: cfg.enabled,
        }
    }

    /// No-op notifier for tests and simulate runs.
    pub fn disabled() -> Self {
        Self {
            client: Client::new(),
            token: None,
            chat_id: None,
            enabled: false,
        }
    }

    pub async fn send(&self, text: &str) {
        if !self.enabled {
            return;
        }
        let (Some(token), Some(chat_id)) = (self.token.as_deref(), self.chat_id.as_deref()) else {
            return;
        };

        let url = format!("https://api.telegram.org/bot{token}/sendMessage");
        let body = SendMessage { chat_id, text };
        match self.client.post(&url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!("telegram notification sent");
            }
            Ok(resp) => warn!("telegram notification failed: HTTP {}", resp.status()),
            Err(e) => warn!("telegram request failed: {e}"),
        }
    }
}

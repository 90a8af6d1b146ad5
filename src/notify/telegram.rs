//! Telegram notification sink

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{error, info};

use crate::core::config::TelegramConfig;
use crate::notify::{AlertLevel, Notifier};

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Sends alerts to a Telegram chat through the Bot API.
pub struct TelegramNotifier {
    client: reqwest::Client,
    send_url: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Self {
        // Bounded client timeout keeps notify from ever stalling a caller.
        let client = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            send_url: format!(
                "https://api.telegram.org/bot{}/sendMessage",
                config.bot_token
            ),
            chat_id: config.chat_id.clone(),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, level: AlertLevel, message: &str) {
        let text = format!("{} {}", level.emoji(), message);
        let body = json!({
            "chat_id": self.chat_id,
            "text": text,
        });

        match self.client.post(&self.send_url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!("Telegram alert sent [{}]: {}", level, message);
            }
            Ok(resp) => {
                error!(
                    "Telegram alert rejected ({}): {}",
                    resp.status(),
                    message
                );
            }
            Err(e) => {
                error!("Telegram alert failed: {}", e);
            }
        }
    }
}

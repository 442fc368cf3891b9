use std::net::IpAddr;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{NotificationChannel, render_message};
use crate::config::TelegramConfig;
use crate::error::{Error, Result};

const API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram bot channel
pub struct TelegramChannel {
    config: TelegramConfig,
    client: Client,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig, client: Client) -> Self {
        Self { config, client }
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, label: &str, ip: IpAddr) -> Result<()> {
        if self.config.bot_api_token.is_empty() || self.config.chat_id.is_empty() {
            return Err(Error::notification("telegram bot_api_token and chat_id are required"));
        }
        let text = render_message(&self.config.message_template, label, ip)?;

        let url = format!("{}/bot{}/sendMessage", API_BASE, self.config.bot_api_token);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "chat_id": self.config.chat_id, "text": text }))
            .send()
            .await
            // The URL carries the bot token; keep it out of the message.
            .map_err(|e| Error::notification(format!("telegram: {}", e.without_url())))?;

        let body: TelegramResponse = response
            .json()
            .await
            .map_err(|e| Error::notification(format!("telegram: {}", e.without_url())))?;

        if !body.ok {
            return Err(Error::notification(format!(
                "telegram rejected the message: {}",
                body.description.unwrap_or_default()
            )));
        }
        Ok(())
    }
}

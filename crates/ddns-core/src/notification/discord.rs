use std::net::IpAddr;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::{NotificationChannel, render_message};
use crate::config::DiscordConfig;
use crate::error::{Error, Result};

/// Discord webhook channel
pub struct DiscordChannel {
    config: DiscordConfig,
    client: Client,
}

impl DiscordChannel {
    pub fn new(config: DiscordConfig, client: Client) -> Self {
        Self { config, client }
    }
}

#[async_trait]
impl NotificationChannel for DiscordChannel {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn send(&self, label: &str, ip: IpAddr) -> Result<()> {
        if self.config.webhook_url.is_empty() {
            return Err(Error::notification("discord webhook_url is empty"));
        }
        let content = render_message(&self.config.message_template, label, ip)?;

        let mut payload = json!({ "content": content });
        if !self.config.username.is_empty() {
            payload["username"] = json!(self.config.username);
        }

        // Discord answers 204 No Content on success.
        let response = self
            .client
            .post(&self.config.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::notification(format!("discord: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::notification(format!(
                "discord answered HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}

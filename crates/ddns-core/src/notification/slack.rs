use std::net::IpAddr;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::{NotificationChannel, render_message};
use crate::config::SlackConfig;
use crate::error::{Error, Result};

/// Slack incoming-webhook channel
pub struct SlackChannel {
    config: SlackConfig,
    client: Client,
}

impl SlackChannel {
    pub fn new(config: SlackConfig, client: Client) -> Self {
        Self { config, client }
    }
}

#[async_trait]
impl NotificationChannel for SlackChannel {
    fn name(&self) -> &'static str {
        "slack"
    }

    async fn send(&self, label: &str, ip: IpAddr) -> Result<()> {
        if self.config.webhook_url.is_empty() {
            return Err(Error::notification("slack webhook_url is empty"));
        }
        let text = render_message(&self.config.message_template, label, ip)?;

        let mut payload = json!({ "text": text });
        if !self.config.channel.is_empty() {
            payload["channel"] = json!(self.config.channel);
        }

        let response = self
            .client
            .post(&self.config.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::notification(format!("slack: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::notification(format!(
                "slack answered HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}

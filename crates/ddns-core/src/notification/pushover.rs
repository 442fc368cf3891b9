use std::net::IpAddr;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::{NotificationChannel, render_message};
use crate::config::PushoverConfig;
use crate::error::{Error, Result};

const MESSAGES_URL: &str = "https://api.pushover.net/1/messages.json";

/// Pushover channel
pub struct PushoverChannel {
    config: PushoverConfig,
    client: Client,
}

impl PushoverChannel {
    pub fn new(config: PushoverConfig, client: Client) -> Self {
        Self { config, client }
    }
}

#[async_trait]
impl NotificationChannel for PushoverChannel {
    fn name(&self) -> &'static str {
        "pushover"
    }

    async fn send(&self, label: &str, ip: IpAddr) -> Result<()> {
        if self.config.token.is_empty() || self.config.user.is_empty() {
            return Err(Error::notification("pushover token and user are required"));
        }
        let message = render_message(&self.config.message_template, label, ip)?;

        let mut payload = json!({
            "token": self.config.token,
            "user": self.config.user,
            "title": "DDNS update",
            "message": message,
        });
        if !self.config.device.is_empty() {
            payload["device"] = json!(self.config.device);
        }

        let response = self
            .client
            .post(MESSAGES_URL)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::notification(format!("pushover: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::notification(format!(
                "pushover answered HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}

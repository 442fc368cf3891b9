//! Change notifications.
//!
//! [`NotificationManager`] implements [`Notifier`] by rendering one label per
//! update pass and handing it to every enabled channel. Channel failures are
//! logged and never reach the engine.

mod discord;
mod pushover;
mod slack;
mod telegram;

use std::net::IpAddr;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error};

use crate::config::Settings;
use crate::error::Result;
use crate::template::{TemplateVars, render};
use crate::traits::Notifier;

pub use discord::DiscordChannel;
pub use pushover::PushoverChannel;
pub use slack::SlackChannel;
pub use telegram::TelegramChannel;

/// Used when a channel has no `message_template`.
pub const DEFAULT_MESSAGE_TEMPLATE: &str = "{{.Domain}} is now {{.CurrentIP}}";

/// A single delivery channel
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Deliver `label` (e.g. `[ www, @ ] of example.com`) for `ip`.
    async fn send(&self, label: &str, ip: IpAddr) -> Result<()>;
}

/// `[ www, @ ] of example.com`
pub fn notification_label(domain: &str, subdomains: &[String]) -> String {
    format!("[ {} ] of {}", subdomains.join(", "), domain)
}

pub(crate) fn render_message(template: &str, label: &str, ip: IpAddr) -> Result<String> {
    let template = if template.trim().is_empty() {
        DEFAULT_MESSAGE_TEMPLATE
    } else {
        template
    };
    let ip = ip.to_string();
    let ip_type = if ip.contains(':') { "IPV6" } else { "IPV4" };
    render(
        template,
        &TemplateVars {
            domain: label,
            current_ip: &ip,
            ip_type,
        },
    )
}

/// Fans a notification out to every configured channel
pub struct NotificationManager {
    channels: Vec<Box<dyn NotificationChannel>>,
}

impl NotificationManager {
    pub fn new(channels: Vec<Box<dyn NotificationChannel>>) -> Self {
        Self { channels }
    }

    /// Build the channels enabled in `settings`.
    pub fn from_settings(settings: &Settings, client: Client) -> Self {
        let notify = &settings.notify;
        let mut channels: Vec<Box<dyn NotificationChannel>> = Vec::new();

        if notify.slack.enabled {
            channels.push(Box::new(SlackChannel::new(notify.slack.clone(), client.clone())));
        }
        if notify.discord.enabled {
            channels.push(Box::new(DiscordChannel::new(notify.discord.clone(), client.clone())));
        }
        if notify.telegram.enabled {
            channels.push(Box::new(TelegramChannel::new(
                notify.telegram.clone(),
                client.clone(),
            )));
        }
        if notify.pushover.enabled {
            channels.push(Box::new(PushoverChannel::new(notify.pushover.clone(), client)));
        }

        Self::new(channels)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

#[async_trait]
impl Notifier for NotificationManager {
    async fn notify(&self, domain: &str, subdomains: &[String], ip: IpAddr) {
        let label = notification_label(domain, subdomains);
        for channel in &self.channels {
            match channel.send(&label, ip).await {
                Ok(()) => debug!("Notification sent via {}", channel.name()),
                Err(e) => error!("Notification via {} failed: {}", channel.name(), e),
            }
        }
    }
}

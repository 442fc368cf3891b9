//! Outbound webhook fired after each successful subdomain update.

use std::net::IpAddr;

use reqwest::{Client, Method};
use tracing::{debug, info};

use crate::config::{IpVersion, WebhookConfig};
use crate::error::{Error, Result};
use crate::template::{TemplateVars, render};

/// A rendered webhook call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<String>,
}

/// Webhook bound to one configuration snapshot.
#[derive(Debug, Clone)]
pub struct Webhook {
    config: WebhookConfig,
    version: IpVersion,
    client: Client,
}

impl Webhook {
    /// `None` when the webhook is disabled or has no URL.
    pub fn new(config: &WebhookConfig, version: IpVersion, client: Client) -> Option<Self> {
        if !config.enabled || config.url.trim().is_empty() {
            return None;
        }
        Some(Self {
            config: config.clone(),
            version,
            client,
        })
    }

    /// Render the call for `hostname` now pointing at `ip`.
    ///
    /// With a request body the body is rendered and POSTed to the URL as-is;
    /// without one the URL itself is rendered and fetched with GET.
    pub fn build_request(&self, hostname: &str, ip: IpAddr) -> Result<WebhookRequest> {
        let ip = ip.to_string();
        let vars = TemplateVars {
            domain: hostname,
            current_ip: &ip,
            ip_type: self.version.as_str(),
        };

        if self.config.request_body.trim().is_empty() {
            Ok(WebhookRequest {
                method: Method::GET,
                url: render(&self.config.url, &vars)?,
                body: None,
            })
        } else {
            Ok(WebhookRequest {
                method: Method::POST,
                url: self.config.url.clone(),
                body: Some(render(&self.config.request_body, &vars)?),
            })
        }
    }

    pub async fn execute(&self, hostname: &str, ip: IpAddr) -> Result<()> {
        let request = self.build_request(hostname, ip)?;
        debug!("Webhook {} {}", request.method, request.url);

        let mut builder = self.client.request(request.method.clone(), &request.url);
        if let Some(body) = request.body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::webhook(format!("{} {}: {}", request.method, request.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::webhook(format!(
                "{} {} answered HTTP {}",
                request.method, request.url, status
            )));
        }

        info!("Webhook delivered for {}", hostname);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn webhook(url: &str, body: &str) -> Webhook {
        let config = WebhookConfig {
            enabled: true,
            url: url.into(),
            request_body: body.into(),
        };
        Webhook::new(&config, IpVersion::V4, Client::new()).unwrap()
    }

    #[test]
    fn disabled_webhook_is_not_built() {
        let config = WebhookConfig {
            enabled: false,
            url: "https://hook.example".into(),
            request_body: String::new(),
        };
        assert!(Webhook::new(&config, IpVersion::V4, Client::new()).is_none());
    }

    #[test]
    fn get_renders_url() {
        let req = webhook("https://hook.example/?host={{.Domain}}&ip={{.CurrentIP}}", "")
            .build_request("www.example.com", "203.0.113.7".parse().unwrap())
            .unwrap();
        assert_eq!(req.method, Method::GET);
        assert_eq!(req.url, "https://hook.example/?host=www.example.com&ip=203.0.113.7");
        assert!(req.body.is_none());
    }

    #[test]
    fn post_renders_body_only() {
        let req = webhook(
            "https://hook.example/{{.Domain}}",
            r#"{"host":"{{.Domain}}","ip":"{{.CurrentIP}}","type":"{{.IPType}}"}"#,
        )
        .build_request("example.com", "203.0.113.7".parse().unwrap())
        .unwrap();
        assert_eq!(req.method, Method::POST);
        assert_eq!(req.url, "https://hook.example/{{.Domain}}");
        assert_eq!(
            req.body.as_deref(),
            Some(r#"{"host":"example.com","ip":"203.0.113.7","type":"IPV4"}"#)
        );
    }
}

//! DuckDNS provider.
//!
//! DuckDNS hosts every name under `duckdns.org`, so only the subdomain label
//! is sent. The update endpoint answers `OK` or `KO` in a plain-text body.

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, DnsProviderFactory};
use ddns_core::{Error, ProviderRegistry, Result, Settings};

const DEFAULT_BASE_URL: &str = "https://www.duckdns.org";

const PROVIDER: &str = "duckdns";

/// DuckDNS provider.
pub struct DuckDnsProvider {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl fmt::Debug for DuckDnsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuckDnsProvider")
            .field("token", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl DuckDnsProvider {
    /// Create a provider from `login_token` and the shared HTTP settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let token = settings.credentials.login_token.trim();
        if token.is_empty() {
            return Err(Error::config("DuckDNS requires login_token"));
        }
        Ok(Self {
            client: ddns_core::http::build_client(settings)?,
            token: token.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Create with custom base URL (for testing).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Query key carrying the address: `ip` for IPv4, `ipv6` for IPv6.
fn address_param(ip: IpAddr) -> &'static str {
    match ip {
        IpAddr::V4(_) => "ip",
        IpAddr::V6(_) => "ipv6",
    }
}

#[async_trait]
impl DnsProvider for DuckDnsProvider {
    async fn update_ip(&self, domain: &str, subdomain: &str, ip: IpAddr) -> Result<()> {
        let address = ip.to_string();
        let response = self
            .client
            .get(format!("{}/update", self.base_url))
            .query(&[
                ("domains", subdomain),
                ("token", self.token.as_str()),
                (address_param(ip), address.as_str()),
            ])
            .send()
            .await
            // The URL carries the token.
            .map_err(|e| Error::provider(PROVIDER, e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::provider(PROVIDER, e.without_url().to_string()))?;

        if !status.is_success() || body.trim() != "OK" {
            return Err(Error::provider(
                PROVIDER,
                format!(
                    "update of {subdomain}.{domain} rejected: {status} {}",
                    body.trim()
                ),
            ));
        }

        tracing::info!(subdomain, domain, %ip, "DuckDNS record updated");
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

/// Factory for creating DuckDNS providers
pub struct DuckDnsFactory;

impl DnsProviderFactory for DuckDnsFactory {
    fn create(&self, settings: &Settings) -> Result<Arc<dyn DnsProvider>> {
        Ok(Arc::new(DuckDnsProvider::from_settings(settings)?))
    }
}

/// Register the DuckDNS provider with a registry
pub fn register(registry: &ProviderRegistry) {
    registry.register_provider(PROVIDER, Box::new(DuckDnsFactory));
}

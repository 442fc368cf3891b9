//! Outbound HTTP client construction
//!
//! Every component that talks HTTP (online IP lookup, providers, webhook,
//! notifications) builds its `reqwest::Client` here so proxy and TLS settings
//! apply uniformly.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use reqwest::{Client, ClientBuilder, Proxy};

use crate::config::{IpVersion, Settings};
use crate::error::{Error, Result};

/// Timeout applied to every outbound request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

fn base_builder(settings: &Settings) -> Result<ClientBuilder> {
    let mut builder = Client::builder().timeout(DEFAULT_TIMEOUT);

    if settings.use_proxy {
        let proxy_url = if settings.socks5_proxy.contains("://") {
            settings.socks5_proxy.clone()
        } else {
            format!("socks5://{}", settings.socks5_proxy)
        };
        let proxy = Proxy::all(&proxy_url)
            .map_err(|e| Error::config(format!("invalid socks5_proxy {proxy_url:?}: {e}")))?;
        builder = builder.proxy(proxy);
    } else {
        // Only the configured proxy is honoured, never *_PROXY from the environment.
        builder = builder.no_proxy();
    }

    if settings.skip_ssl_verify {
        builder = builder.danger_accept_invalid_certs(true);
    }

    Ok(builder)
}

/// Client for provider APIs, webhooks and notifications.
pub fn build_client(settings: &Settings) -> Result<Client> {
    base_builder(settings)?
        .build()
        .map_err(|e| Error::http(format!("failed to build HTTP client: {e}")))
}

/// Client for online IP lookups.
///
/// When IPv4 is requested the client binds to `0.0.0.0`, so lookup endpoints
/// only ever see (and echo back) the IPv4 address.
pub fn build_discovery_client(settings: &Settings) -> Result<Client> {
    let mut builder = base_builder(settings)?;
    if settings.ip_type == IpVersion::V4 {
        builder = builder.local_address(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }
    if !settings.user_agent.is_empty() {
        builder = builder.user_agent(settings.user_agent.clone());
    }
    builder
        .build()
        .map_err(|e| Error::http(format!("failed to build discovery client: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_scheme_is_added_when_missing() {
        let settings = Settings {
            use_proxy: true,
            socks5_proxy: "127.0.0.1:1080".into(),
            ..Settings::default()
        };
        assert!(build_client(&settings).is_ok());
        assert!(build_discovery_client(&settings).is_ok());
    }

    #[test]
    fn malformed_proxy_is_a_config_error() {
        let settings = Settings {
            use_proxy: true,
            socks5_proxy: "socks5://[not a host".into(),
            ..Settings::default()
        };
        assert!(matches!(build_client(&settings), Err(Error::Config(_))));
    }
}

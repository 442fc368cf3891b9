//! RouterOS (MikroTik) REST lookup of an interface address.

use std::net::IpAddr;

use reqwest::Client;
use serde::Deserialize;

use crate::config::MikrotikConfig;
use crate::error::{Error, Result};
use crate::http::DEFAULT_TIMEOUT;

#[derive(Debug, Deserialize)]
struct RouterAddress {
    address: String,
}

/// Client for the router's `/rest/ip/address` endpoint.
///
/// Routers ship self-signed certificates, so verification is disabled for
/// this client only.
pub fn build_router_client() -> Result<Client> {
    Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .danger_accept_invalid_certs(true)
        .build()
        .map_err(|e| Error::http(format!("failed to build router client: {e}")))
}

/// Read the first address assigned to `config.interface`.
pub async fn router_ip(client: &Client, config: &MikrotikConfig) -> Result<IpAddr> {
    let url = format!("{}/rest/ip/address", config.addr.trim_end_matches('/'));
    let response = client
        .get(&url)
        .query(&[
            ("interface", config.interface.as_str()),
            (".proplist", "address"),
        ])
        .basic_auth(&config.username, Some(&config.password))
        .send()
        .await
        .map_err(|e| Error::ip_source(format!("router {}: {}", config.addr, e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::ip_source(format!(
            "router {} answered HTTP {}",
            config.addr, status
        )));
    }

    let body = response
        .text()
        .await
        .map_err(|e| Error::ip_source(format!("router {}: {}", config.addr, e)))?;
    parse_router_response(&body, &config.interface)
}

/// Parse `[{"address": "a.b.c.d/nn"}, ...]` and strip the prefix length.
pub fn parse_router_response(body: &str, interface: &str) -> Result<IpAddr> {
    let entries: Vec<RouterAddress> = serde_json::from_str(body)
        .map_err(|e| Error::ip_source(format!("unexpected router response: {e}")))?;

    let first = entries
        .first()
        .ok_or_else(|| Error::ip_source(format!("no address on interface {interface}")))?;

    let addr = first.address.split('/').next().unwrap_or_default();
    addr.parse()
        .map_err(|_| Error::ip_source(format!("router returned invalid address {:?}", first.address)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_prefix_length() {
        let body = r#"[{".id":"*1","address":"100.64.12.9/32"},{"address":"10.0.0.1/24"}]"#;
        assert_eq!(
            parse_router_response(body, "pppoe-out1").unwrap(),
            "100.64.12.9".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn empty_list_is_an_error() {
        let err = parse_router_response("[]", "ether1").unwrap_err();
        assert!(err.to_string().contains("ether1"));
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_router_response("<html/>", "ether1").is_err());
        assert!(parse_router_response(r#"[{"address":"bogus"}]"#, "ether1").is_err());
    }
}

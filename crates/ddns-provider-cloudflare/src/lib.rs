// # Cloudflare DNS Provider
//
// Cloudflare API v4 client for the DDNS system.
//
// One `update_ip` call performs a single attempt:
//
// 1. `GET /zones?name=<domain>` to find the zone
// 2. `GET /zones/:zone_id/dns_records?type=<A|AAAA>&name=<host>` to find the record
// 3. `PUT /zones/:zone_id/dns_records/:record_id` when the content differs
//
// Retries are owned by the scheduler: a failed call surfaces as an error and
// the next tick tries again.
//
// ## Credentials
//
// - `login_token`: API token with Zone:DNS:Edit permission (preferred)
// - `email` + `password`: account email and Global API Key
//
// Credentials never appear in logs or `Debug` output.

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use ddns_core::config::ROOT_SUBDOMAIN;
use ddns_core::traits::{DnsProvider, DnsProviderFactory};
use ddns_core::{Error, ProviderRegistry, Result, Settings};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

const PROVIDER: &str = "cloudflare";

/// How requests authenticate against the API
#[derive(Clone)]
enum Credentials {
    /// `Authorization: Bearer <token>`
    Token(String),
    /// `X-Auth-Email` / `X-Auth-Key`
    GlobalKey { email: String, key: String },
}

impl Credentials {
    fn from_settings(settings: &Settings) -> Result<Self> {
        let creds = &settings.credentials;
        if !creds.login_token.trim().is_empty() {
            return Ok(Self::Token(creds.login_token.trim().to_string()));
        }
        if !creds.email.trim().is_empty() && !creds.password.trim().is_empty() {
            return Ok(Self::GlobalKey {
                email: creds.email.trim().to_string(),
                key: creds.password.trim().to_string(),
            });
        }
        Err(Error::config(
            "Cloudflare requires login_token, or email and password (global API key)",
        ))
    }

    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Self::Token(token) => request.bearer_auth(token),
            Self::GlobalKey { email, key } => request
                .header("X-Auth-Email", email)
                .header("X-Auth-Key", key),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Token(_) => "api-token",
            Self::GlobalKey { .. } => "global-key",
        }
    }
}

/// Response envelope shared by every API v4 endpoint
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
}

/// A DNS record as returned and accepted by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DnsRecord {
    #[serde(default, skip_serializing)]
    id: String,
    #[serde(rename = "type")]
    record_type: String,
    name: String,
    content: String,
    #[serde(default)]
    proxied: bool,
    #[serde(default = "auto_ttl")]
    ttl: u32,
}

fn auto_ttl() -> u32 {
    1
}

impl<T> Envelope<T> {
    fn into_result(self, context: &str) -> Result<Option<T>> {
        if self.success {
            return Ok(self.result);
        }
        let details: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{} ({})", e.message, e.code))
            .collect();
        Err(Error::provider(
            PROVIDER,
            format!("{context}: {}", details.join("; ")),
        ))
    }
}

/// Map a non-success HTTP status to the matching core error
fn status_error(status: StatusCode, body: &str, context: &str) -> Error {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::auth(format!(
            "{context}: invalid credentials or insufficient permissions ({status})"
        )),
        StatusCode::NOT_FOUND => Error::not_found(format!("{context}: {status}")),
        StatusCode::TOO_MANY_REQUESTS => {
            Error::provider(PROVIDER, format!("{context}: rate limited ({status})"))
        }
        _ => Error::provider(PROVIDER, format!("{context}: {status} - {}", body.trim())),
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response, context: &str) -> Result<Option<T>> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| Error::provider(PROVIDER, format!("{context}: {e}")))?;

    if !status.is_success() {
        return Err(status_error(status, &body, context));
    }

    let envelope: Envelope<T> = serde_json::from_str(&body)
        .map_err(|e| Error::provider(PROVIDER, format!("{context}: malformed response: {e}")))?;
    envelope.into_result(context)
}

/// Cloudflare DNS provider
pub struct CloudflareProvider {
    credentials: Credentials,
    client: reqwest::Client,
    base_url: String,
}

impl fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("credentials", &self.credentials.kind())
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl CloudflareProvider {
    /// Create a provider from settings, using the shared outbound client
    /// configuration (proxy, TLS verification).
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let credentials = Credentials::from_settings(settings)?;
        let client = ddns_core::http::build_client(settings)?;
        Ok(Self {
            credentials,
            client,
            base_url: CLOUDFLARE_API_BASE.to_string(),
        })
    }

    /// Point the provider at a different API root (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn zone_id(&self, domain: &str) -> Result<String> {
        let context = format!("zone lookup for {domain}");
        let request = self
            .client
            .get(format!("{}/zones", self.base_url))
            .query(&[("name", domain)]);
        let response = self.credentials.apply(request).send().await?;

        let zones: Vec<Zone> = decode(response, &context).await?.unwrap_or_default();
        zones
            .into_iter()
            .next()
            .map(|zone| zone.id)
            .ok_or_else(|| Error::not_found(format!("zone {domain} not found")))
    }

    async fn record(&self, zone_id: &str, hostname: &str, record_type: &str) -> Result<DnsRecord> {
        let context = format!("record lookup for {hostname} ({record_type})");
        let request = self
            .client
            .get(format!("{}/zones/{}/dns_records", self.base_url, zone_id))
            .query(&[("type", record_type), ("name", hostname)]);
        let response = self.credentials.apply(request).send().await?;

        let records: Vec<DnsRecord> = decode(response, &context).await?.unwrap_or_default();
        records
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(format!("{record_type} record {hostname} not found")))
    }

    async fn put_record(&self, zone_id: &str, record: &DnsRecord) -> Result<()> {
        let context = format!("update of {}", record.name);
        let request = self
            .client
            .put(format!(
                "{}/zones/{}/dns_records/{}",
                self.base_url, zone_id, record.id
            ))
            .json(record);
        let response = self.credentials.apply(request).send().await?;

        decode::<serde_json::Value>(response, &context).await?;
        Ok(())
    }
}

fn hostname(domain: &str, subdomain: &str) -> String {
    if subdomain == ROOT_SUBDOMAIN {
        domain.to_string()
    } else {
        format!("{subdomain}.{domain}")
    }
}

fn record_type(ip: IpAddr) -> &'static str {
    match ip {
        IpAddr::V4(_) => "A",
        IpAddr::V6(_) => "AAAA",
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    async fn update_ip(&self, domain: &str, subdomain: &str, ip: IpAddr) -> Result<()> {
        let hostname = hostname(domain, subdomain);
        let record_type = record_type(ip);

        let zone_id = self.zone_id(domain).await?;
        let mut record = self.record(&zone_id, &hostname, record_type).await?;

        if record.content.parse::<IpAddr>().ok() == Some(ip) {
            tracing::info!(record = %hostname, %ip, "Cloudflare record already up to date");
            return Ok(());
        }

        tracing::info!(
            record = %hostname,
            previous = %record.content,
            %ip,
            "Updating Cloudflare record"
        );
        record.content = ip.to_string();
        self.put_record(&zone_id, &record).await?;

        tracing::info!(record = %hostname, %ip, "Cloudflare record updated");
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

/// Factory for creating Cloudflare providers
pub struct CloudflareFactory;

impl DnsProviderFactory for CloudflareFactory {
    fn create(&self, settings: &Settings) -> Result<Arc<dyn DnsProvider>> {
        Ok(Arc::new(CloudflareProvider::from_settings(settings)?))
    }
}

/// Register the Cloudflare provider with a registry
///
/// # Example
///
/// ```rust
/// use ddns_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// ddns_provider_cloudflare::register(&registry);
/// assert!(registry.has_provider("Cloudflare"));
/// ```
pub fn register(registry: &ProviderRegistry) {
    registry.register_provider(PROVIDER, Box::new(CloudflareFactory));
}

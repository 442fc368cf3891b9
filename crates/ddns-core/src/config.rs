//! Configuration types for the DDNS system
//!
//! [`Settings`] is the single configuration snapshot shared by every component.
//! It is loaded from a JSON or YAML file (with `DDNS_*` environment overrides),
//! validated once, and replaced wholesale on reload.

use std::fmt;
use std::io::Write;
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;

use ::config::{Config, Environment, File, FileFormat, Map};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// Subdomain sentinel that addresses the zone apex.
pub const ROOT_SUBDOMAIN: &str = "@";

/// Default polling interval in seconds.
pub const DEFAULT_INTERVAL_SECS: u64 = 300;

/// Main DDNS configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Provider name, matched case-insensitively against the registry
    pub provider: String,

    /// Provider credentials
    #[serde(flatten)]
    pub credentials: Credentials,

    /// Domains to keep in sync
    #[serde(default)]
    pub domains: Vec<Domain>,

    /// Online lookup endpoints for IPv4
    #[serde(default)]
    pub ip_urls: Vec<String>,

    /// Single IPv4 lookup endpoint (appended after `ip_urls`)
    #[serde(default)]
    pub ip_url: String,

    /// Online lookup endpoints for IPv6
    #[serde(default)]
    pub ipv6_urls: Vec<String>,

    /// Single IPv6 lookup endpoint (appended after `ipv6_urls`)
    #[serde(default)]
    pub ipv6_url: String,

    /// Address family to discover and publish
    #[serde(default)]
    pub ip_type: IpVersion,

    /// Local interface to read the address from when no online source is set
    #[serde(default)]
    pub ip_interface: String,

    /// RouterOS REST endpoint used as the first discovery strategy
    #[serde(default)]
    pub mikrotik: MikrotikConfig,

    /// Polling interval in seconds
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// User-Agent sent to online lookup endpoints
    #[serde(default)]
    pub user_agent: String,

    /// Explicit DNS server for authoritative lookups (`ip` or `ip:port`)
    #[serde(default)]
    pub resolver: String,

    /// Route outbound HTTP through `socks5_proxy`
    #[serde(default)]
    pub use_proxy: bool,

    #[serde(default)]
    pub socks5_proxy: String,

    /// Accept invalid TLS certificates on outbound HTTP
    #[serde(default)]
    pub skip_ssl_verify: bool,

    #[serde(default)]
    pub webhook: WebhookConfig,

    #[serde(default)]
    pub notify: NotifyConfig,

    #[serde(default)]
    pub web_panel: WebPanelConfig,

    /// Perform exactly one pass per domain and exit
    #[serde(default)]
    pub run_once: bool,
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECS
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: String::new(),
            credentials: Credentials::default(),
            domains: Vec::new(),
            ip_urls: Vec::new(),
            ip_url: String::new(),
            ipv6_urls: Vec::new(),
            ipv6_url: String::new(),
            ip_type: IpVersion::V4,
            ip_interface: String::new(),
            mikrotik: MikrotikConfig::default(),
            interval: DEFAULT_INTERVAL_SECS,
            user_agent: String::new(),
            resolver: String::new(),
            use_proxy: false,
            socks5_proxy: String::new(),
            skip_ssl_verify: false,
            webhook: WebhookConfig::default(),
            notify: NotifyConfig::default(),
            web_panel: WebPanelConfig::default(),
            run_once: false,
        }
    }
}

impl Settings {
    /// Load settings from a JSON or YAML file, applying `DDNS_*` env overrides.
    ///
    /// Nested keys are addressed with a double underscore, e.g.
    /// `DDNS_WEBHOOK__URL`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with_env(path.as_ref(), None)
    }

    /// `env` replaces the process environment when given.
    fn load_with_env(path: &Path, env: Option<Map<String, String>>) -> Result<Self> {
        let format = file_format(path)?;

        let settings: Settings = Config::builder()
            .add_source(File::from(path).format(format))
            .add_source(
                Environment::with_prefix("DDNS")
                    .prefix_separator("_")
                    .separator("__")
                    .source(env),
            )
            .build()?
            .try_deserialize()?;

        Ok(settings)
    }

    /// Persist settings as pretty-printed JSON.
    ///
    /// The file is written next to `path` and renamed over it, so the watcher
    /// never reads a half-written config.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if !matches!(file_format(path)?, FileFormat::Json) {
            return Err(Error::config(format!(
                "cannot write {}: only JSON config files are writable",
                path.display()
            )));
        }
        let data = serde_json::to_string_pretty(self)?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(data.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.provider.trim().is_empty() {
            return Err(Error::config("provider cannot be empty"));
        }
        if self.interval == 0 {
            return Err(Error::config("interval must be > 0"));
        }
        for domain in &self.domains {
            domain.validate()?;
        }
        if self.webhook.enabled && self.webhook.url.trim().is_empty() {
            return Err(Error::config("webhook is enabled but has no url"));
        }
        if self.mikrotik.enabled && self.mikrotik.addr.trim().is_empty() {
            return Err(Error::config("mikrotik is enabled but has no addr"));
        }
        if self.use_proxy && self.socks5_proxy.trim().is_empty() {
            return Err(Error::config("use_proxy is set but socks5_proxy is empty"));
        }
        Ok(())
    }

    /// Online lookup endpoints for the configured family, in rotation order.
    pub fn discovery_urls(&self) -> Vec<String> {
        let (list, single) = match self.ip_type {
            IpVersion::V4 => (&self.ip_urls, &self.ip_url),
            IpVersion::V6 => (&self.ipv6_urls, &self.ipv6_url),
        };
        list.iter()
            .chain(std::iter::once(single))
            .map(|u| u.trim())
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Explicit resolver, if one is configured.
    pub fn resolver_address(&self) -> Option<&str> {
        let resolver = self.resolver.trim();
        (!resolver.is_empty()).then_some(resolver)
    }

    pub fn run_mode(&self) -> RunMode {
        if self.run_once {
            RunMode::RunOnce
        } else {
            RunMode::Continuous
        }
    }

    /// Number of subdomains across all domains.
    pub fn subdomain_count(&self) -> usize {
        self.domains.iter().map(|d| d.sub_domains.len()).sum()
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("provider", &self.provider)
            .field("credentials", &self.credentials)
            .field("domains", &self.domains)
            .field("ip_type", &self.ip_type)
            .field("discovery_urls", &self.discovery_urls())
            .field("ip_interface", &self.ip_interface)
            .field("mikrotik", &self.mikrotik)
            .field("interval", &self.interval)
            .field("resolver", &self.resolver)
            .field("use_proxy", &self.use_proxy)
            .field("webhook", &self.webhook.enabled)
            .field("web_panel", &self.web_panel)
            .field("run_once", &self.run_once)
            .finish_non_exhaustive()
    }
}

fn file_format(path: &Path) -> Result<FileFormat> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Ok(FileFormat::Json),
        Some("yaml") | Some("yml") => Ok(FileFormat::Yaml),
        other => Err(Error::config(format!(
            "unsupported config file extension {:?} for {}",
            other,
            path.display()
        ))),
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() { "" } else { "<redacted>" }
}

/// Whether the process keeps polling or performs a single pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Continuous,
    RunOnce,
}

/// Provider credentials. Which fields are used depends on the provider.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub email: String,
    pub password: String,
    pub login_token: String,
    pub app_key: String,
    pub app_secret: String,
    pub consumer_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &redact(&self.password))
            .field("login_token", &redact(&self.login_token))
            .field("app_key", &redact(&self.app_key))
            .field("app_secret", &redact(&self.app_secret))
            .field("consumer_key", &redact(&self.consumer_key))
            .finish()
    }
}

/// A managed domain and the subdomains published under it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub domain_name: String,
    #[serde(default)]
    pub sub_domains: Vec<String>,
}

impl Domain {
    pub fn new<S: Into<String>>(domain_name: impl Into<String>, sub_domains: impl IntoIterator<Item = S>) -> Self {
        Self {
            domain_name: domain_name.into(),
            sub_domains: sub_domains.into_iter().map(Into::into).collect(),
        }
    }

    /// Fully-qualified hostname for a subdomain (`@` maps to the apex).
    pub fn hostname(&self, subdomain: &str) -> String {
        if subdomain == ROOT_SUBDOMAIN {
            self.domain_name.clone()
        } else {
            format!("{}.{}", subdomain, self.domain_name)
        }
    }

    fn validate(&self) -> Result<()> {
        if self.domain_name.trim().is_empty() {
            return Err(Error::config("domain name should not be empty"));
        }
        if self.sub_domains.iter().any(|s| s.trim().is_empty()) {
            return Err(Error::config(format!(
                "subdomain of {} should not be empty",
                self.domain_name
            )));
        }
        Ok(())
    }
}

/// Address family to discover and publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum IpVersion {
    #[default]
    V4,
    V6,
}

impl IpVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            IpVersion::V4 => "IPV4",
            IpVersion::V6 => "IPV6",
        }
    }

    /// DNS record type carrying this family.
    pub fn record_type(&self) -> &'static str {
        match self {
            IpVersion::V4 => "A",
            IpVersion::V6 => "AAAA",
        }
    }

    pub fn matches(&self, ip: &IpAddr) -> bool {
        matches!(
            (self, ip),
            (IpVersion::V4, IpAddr::V4(_)) | (IpVersion::V6, IpAddr::V6(_))
        )
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IpVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "ipv4" | "v4" => Ok(IpVersion::V4),
            "ipv6" | "v6" => Ok(IpVersion::V6),
            other => Err(Error::config(format!("invalid ip_type {other:?}"))),
        }
    }
}

impl TryFrom<String> for IpVersion {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<IpVersion> for String {
    fn from(value: IpVersion) -> Self {
        value.as_str().to_string()
    }
}

/// RouterOS REST API access
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MikrotikConfig {
    pub enabled: bool,
    /// Base URL, e.g. `https://192.168.88.1`
    pub addr: String,
    pub username: String,
    pub password: String,
    /// Interface whose address is published, e.g. `pppoe-out1`
    pub interface: String,
}

impl fmt::Debug for MikrotikConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MikrotikConfig")
            .field("enabled", &self.enabled)
            .field("addr", &self.addr)
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("interface", &self.interface)
            .finish()
    }
}

/// Outbound webhook fired after each successful subdomain update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub enabled: bool,
    /// URL template; used as-is for POST, rendered for GET
    pub url: String,
    /// JSON body template; empty means GET
    pub request_body: String,
}

/// Notification channels
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub slack: SlackConfig,
    pub discord: DiscordConfig,
    pub telegram: TelegramConfig,
    pub pushover: PushoverConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    pub enabled: bool,
    pub webhook_url: String,
    pub channel: String,
    pub message_template: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub enabled: bool,
    pub webhook_url: String,
    pub username: String,
    pub message_template: String,
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub enabled: bool,
    pub bot_api_token: String,
    pub chat_id: String,
    pub message_template: String,
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("enabled", &self.enabled)
            .field("bot_api_token", &redact(&self.bot_api_token))
            .field("chat_id", &self.chat_id)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PushoverConfig {
    pub enabled: bool,
    pub token: String,
    pub user: String,
    pub device: String,
    pub message_template: String,
}

impl fmt::Debug for PushoverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushoverConfig")
            .field("enabled", &self.enabled)
            .field("token", &redact(&self.token))
            .field("user", &self.user)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

/// Embedded control panel
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebPanelConfig {
    pub enabled: bool,
    /// Listen address; the daemon's `--addr` is used when empty
    pub addr: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for WebPanelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebPanelConfig")
            .field("enabled", &self.enabled)
            .field("addr", &self.addr)
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Settings {
        Settings {
            provider: "Cloudflare".into(),
            domains: vec![Domain::new("example.com", ["www", "@"])],
            ..Settings::default()
        }
    }

    #[test]
    fn hostname_maps_root_sentinel_to_apex() {
        let domain = Domain::new("example.com", ["www", "@"]);
        assert_eq!(domain.hostname("www"), "www.example.com");
        assert_eq!(domain.hostname("@"), "example.com");
    }

    #[test]
    fn discovery_urls_follow_ip_type_and_drop_blanks() {
        let mut settings = valid();
        settings.ip_urls = vec!["https://a.example".into(), " ".into()];
        settings.ip_url = "https://b.example".into();
        settings.ipv6_urls = vec!["https://v6.example".into()];

        assert_eq!(
            settings.discovery_urls(),
            vec!["https://a.example", "https://b.example"]
        );

        settings.ip_type = IpVersion::V6;
        assert_eq!(settings.discovery_urls(), vec!["https://v6.example"]);
    }

    #[test]
    fn validate_rejects_empty_names() {
        assert!(valid().validate().is_ok());

        let mut settings = valid();
        settings.domains.push(Domain::new("", ["www"]));
        assert!(settings.validate().is_err());

        let mut settings = valid();
        settings.domains[0].sub_domains.push(String::new());
        assert!(settings.validate().is_err());

        let mut settings = valid();
        settings.interval = 0;
        assert!(settings.validate().is_err());

        let mut settings = valid();
        settings.webhook.enabled = true;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn ip_type_parses_case_insensitively() {
        assert_eq!("IPV6".parse::<IpVersion>().unwrap(), IpVersion::V6);
        assert_eq!("ipv4".parse::<IpVersion>().unwrap(), IpVersion::V4);
        assert_eq!("".parse::<IpVersion>().unwrap(), IpVersion::V4);
        assert!("ipv5".parse::<IpVersion>().is_err());
    }

    #[test]
    fn load_reads_json_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "provider": "DuckDNS",
                "login_token": "secret",
                "domains": [{"domain_name": "example.com", "sub_domains": ["www"]}],
                "ip_type": "IPv6",
                "interval": 60
            }"#,
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.provider, "DuckDNS");
        assert_eq!(settings.credentials.login_token, "secret");
        assert_eq!(settings.ip_type, IpVersion::V6);
        assert_eq!(settings.interval, 60);
        assert!(!settings.run_once);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn save_then_load_preserves_domains() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        valid().save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.domains, valid().domains);
        assert!(valid().save(dir.path().join("config.yaml")).is_err());
    }

    #[test]
    fn save_replaces_the_file_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        valid().save(&path).unwrap();

        let mut edited = valid();
        edited.interval = 42;
        edited.save(&path).unwrap();

        assert_eq!(Settings::load(&path).unwrap().interval, 42);
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("config.json")]);
    }

    #[test]
    fn environment_overrides_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut base = valid();
        base.interval = 300;
        base.save(&path).unwrap();

        let from_file = Settings::load_with_env(&path, Some(Map::new())).unwrap();
        assert_eq!(from_file.interval, 300);

        let env = Map::from([
            ("DDNS_INTERVAL".to_string(), "60".to_string()),
            ("DDNS_WEBHOOK__URL".to_string(), "https://hook.example/{{.Domain}}".to_string()),
            ("OTHER_INTERVAL".to_string(), "5".to_string()),
        ]);
        let overridden = Settings::load_with_env(&path, Some(env)).unwrap();
        assert_eq!(overridden.interval, 60);
        assert_eq!(overridden.webhook.url, "https://hook.example/{{.Domain}}");
        assert_eq!(overridden.domains, base.domains);
    }

    #[test]
    fn debug_redacts_credentials() {
        let mut settings = valid();
        settings.credentials.login_token = "super-secret-token".into();
        settings.mikrotik.password = "hunter2".into();

        let debug = format!("{:?}", settings);
        assert!(!debug.contains("super-secret-token"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }
}

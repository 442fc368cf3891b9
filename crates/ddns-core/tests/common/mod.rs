//! Test doubles and common utilities for architecture contract tests
//!
//! These doubles record what the engine and manager do to them so tests can
//! assert on call counts and arguments without any network access (except
//! the loopback [`HttpResponder`]).

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ddns_core::config::Domain;
use ddns_core::error::{Error, LookupError, Result};
use ddns_core::traits::{DnsProvider, DnsProviderFactory, IpSource, Notifier, RecordLookup};
use ddns_core::{IpVersion, ProviderRegistry, Settings};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const OLD_IP: IpAddr = IpAddr::V4(std::net::Ipv4Addr::new(198, 51, 100, 1));
pub const NEW_IP: IpAddr = IpAddr::V4(std::net::Ipv4Addr::new(203, 0, 113, 7));

/// Name the mock provider is registered under
pub const MOCK_PROVIDER: &str = "mock";

/// An IpSource whose address the test sets directly
#[derive(Default)]
pub struct FixedIpSource {
    ip: Mutex<Option<IpAddr>>,
    current_calls: AtomicUsize,
    config_updates: AtomicUsize,
}

impl FixedIpSource {
    pub fn new(ip: Option<IpAddr>) -> Arc<Self> {
        Arc::new(Self {
            ip: Mutex::new(ip),
            ..Self::default()
        })
    }

    pub fn set(&self, ip: Option<IpAddr>) {
        *self.ip.lock().unwrap() = ip;
    }

    pub fn current_calls(&self) -> usize {
        self.current_calls.load(Ordering::SeqCst)
    }

    pub fn config_updates(&self) -> usize {
        self.config_updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IpSource for FixedIpSource {
    async fn current(&self) -> Option<IpAddr> {
        self.current_calls.fetch_add(1, Ordering::SeqCst);
        *self.ip.lock().unwrap()
    }

    fn cached(&self) -> Option<IpAddr> {
        *self.ip.lock().unwrap()
    }

    async fn update_configuration(&self, _settings: &Settings) {
        self.config_updates.fetch_add(1, Ordering::SeqCst);
    }
}

/// Table-driven authoritative lookup; unknown names are NXDOMAIN
#[derive(Default)]
pub struct MockRecordLookup {
    table: Mutex<HashMap<String, std::result::Result<IpAddr, LookupError>>>,
    queries: Mutex<Vec<String>>,
}

impl MockRecordLookup {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn resolves(&self, hostname: &str, ip: IpAddr) {
        self.table
            .lock()
            .unwrap()
            .insert(hostname.to_string(), Ok(ip));
    }

    pub fn fails(&self, hostname: &str, err: LookupError) {
        self.table
            .lock()
            .unwrap()
            .insert(hostname.to_string(), Err(err));
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordLookup for MockRecordLookup {
    async fn lookup(
        &self,
        hostname: &str,
        _resolver: Option<&str>,
        _version: IpVersion,
    ) -> std::result::Result<IpAddr, LookupError> {
        self.queries.lock().unwrap().push(hostname.to_string());
        self.table
            .lock()
            .unwrap()
            .get(hostname)
            .cloned()
            .unwrap_or_else(|| {
                Err(LookupError::NotFound {
                    hostname: hostname.to_string(),
                })
            })
    }
}

/// One recorded provider call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCall {
    pub domain: String,
    pub subdomain: String,
    pub ip: IpAddr,
}

/// Mock DNS provider that records calls and can be told to fail
#[derive(Default)]
pub struct MockDnsProvider {
    calls: Mutex<Vec<ProviderCall>>,
    failing_domains: Mutex<HashSet<String>>,
    delay: Mutex<Duration>,
}

impl MockDnsProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every update for `domain` fails from now on
    pub fn fail_domain(&self, domain: &str) {
        self.failing_domains
            .lock()
            .unwrap()
            .insert(domain.to_string());
    }

    pub fn heal(&self) {
        self.failing_domains.lock().unwrap().clear();
    }

    /// Sleep this long inside every update
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, domain: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.domain == domain)
            .count()
    }
}

#[async_trait]
impl DnsProvider for MockDnsProvider {
    async fn update_ip(&self, domain: &str, subdomain: &str, ip: IpAddr) -> Result<()> {
        self.calls.lock().unwrap().push(ProviderCall {
            domain: domain.to_string(),
            subdomain: subdomain.to_string(),
            ip,
        });

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.failing_domains.lock().unwrap().contains(domain) {
            return Err(Error::provider(MOCK_PROVIDER, "HTTP 500"));
        }
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        MOCK_PROVIDER
    }
}

/// Factory handing out one shared [`MockDnsProvider`]
pub struct MockProviderFactory {
    provider: Arc<MockDnsProvider>,
    created: Arc<AtomicUsize>,
}

impl DnsProviderFactory for MockProviderFactory {
    fn create(&self, _settings: &Settings) -> Result<Arc<dyn DnsProvider>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(self.provider.clone())
    }
}

/// Registry with the mock provider; the counter tracks `create` calls
pub fn mock_registry(provider: &Arc<MockDnsProvider>) -> (Arc<ProviderRegistry>, Arc<AtomicUsize>) {
    let created = Arc::new(AtomicUsize::new(0));
    let registry = ProviderRegistry::new();
    registry.register_provider(
        MOCK_PROVIDER,
        Box::new(MockProviderFactory {
            provider: provider.clone(),
            created: created.clone(),
        }),
    );
    (Arc::new(registry), created)
}

/// One recorded notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub domain: String,
    pub subdomains: Vec<String>,
    pub ip: IpAddr,
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, domain: &str, subdomains: &[String], ip: IpAddr) {
        self.sent.lock().unwrap().push(Notification {
            domain: domain.to_string(),
            subdomains: subdomains.to_vec(),
            ip,
        });
    }
}

/// Settings using the mock provider
pub fn mock_settings(domains: Vec<Domain>) -> Settings {
    Settings {
        provider: MOCK_PROVIDER.to_string(),
        domains,
        interval: 3600,
        ..Settings::default()
    }
}

/// Poll `cond` every 10ms until it holds or `limit` passes.
pub async fn wait_until(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

/// Minimal loopback HTTP server answering fixed bodies per path
pub struct HttpResponder {
    pub base_url: String,
    hits: Arc<Mutex<HashMap<String, usize>>>,
    task: JoinHandle<()>,
}

impl HttpResponder {
    /// `routes` maps a path to `(status, body)`; other paths get 404.
    pub async fn start(routes: Vec<(&'static str, u16, &'static str)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let hits: Arc<Mutex<HashMap<String, usize>>> = Arc::default();
        let routes: HashMap<&'static str, (u16, &'static str)> = routes
            .into_iter()
            .map(|(path, status, body)| (path, (status, body)))
            .collect();

        let task = {
            let hits = hits.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((mut socket, _)) = listener.accept().await else {
                        break;
                    };
                    let mut buf = vec![0u8; 4096];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buf[..n]).to_string();
                    let path = request
                        .split_whitespace()
                        .nth(1)
                        .unwrap_or("/")
                        .to_string();
                    *hits.lock().unwrap().entry(path.clone()).or_default() += 1;

                    let (status, body) = routes.get(path.as_str()).copied().unwrap_or((404, ""));
                    let response = format!(
                        "HTTP/1.1 {status} X\r\ncontent-type: text/plain\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                }
            })
        };

        Self {
            base_url,
            hits,
            task,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

impl Drop for HttpResponder {
    fn drop(&mut self) {
        self.task.abort();
    }
}

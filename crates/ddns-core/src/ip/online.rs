//! Online lookup: ask "what is my IP" endpoints in round-robin order.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{LazyLock, PoisonError, RwLock};
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::IpVersion;

/// Pause between failed attempts so a dead endpoint cannot spin the loop.
pub const RETRY_PAUSE: Duration = Duration::from_millis(300);

static IP_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9A-Fa-f:.]{2,}").expect("token pattern is valid"));

/// Result of scanning a response body for an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extracted {
    /// First literal found, of the requested family
    Match(IpAddr),
    /// First literal found, of the other family
    Mismatch(IpAddr),
    /// No literal in the body
    Missing,
}

/// Find the first IP literal in `body` and check it against `version`.
pub fn extract_ip(body: &str, version: IpVersion) -> Extracted {
    let candidate = IP_TOKEN
        .find_iter(body)
        .find_map(|m| parse_token(m.as_str()));

    match candidate {
        Some(ip) if version.matches(&ip) => Extracted::Match(ip),
        Some(ip) => Extracted::Mismatch(ip),
        None => Extracted::Missing,
    }
}

fn parse_token(token: &str) -> Option<IpAddr> {
    let token = token.trim_end_matches('.');
    token
        .parse()
        .ok()
        .or_else(|| token.strip_prefix(':').and_then(|t| t.parse().ok()))
}

/// Lookup endpoints with a shared, monotonically advancing cursor.
///
/// The index is reduced modulo the current list length while the read lock is
/// held, so replacing the list with a shorter one never yields an
/// out-of-range pick.
#[derive(Debug, Default)]
pub struct UrlRotation {
    urls: RwLock<Vec<String>>,
    cursor: AtomicU64,
}

impl UrlRotation {
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            urls: RwLock::new(urls),
            cursor: AtomicU64::new(0),
        }
    }

    /// Next endpoint, or `None` when the list is empty.
    pub fn next_url(&self) -> Option<String> {
        let urls = self.urls.read().unwrap_or_else(PoisonError::into_inner);
        if urls.is_empty() {
            return None;
        }
        let n = self.cursor.fetch_add(1, Ordering::Relaxed);
        let idx = (n % urls.len() as u64) as usize;
        Some(urls[idx].clone())
    }

    /// Swap the endpoint list; the next pick starts from the first entry.
    pub fn replace(&self, urls: Vec<String>) {
        let mut guard = self.urls.write().unwrap_or_else(PoisonError::into_inner);
        *guard = urls;
        self.cursor.store(0, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.urls.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// How long an online resolution may keep trying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvePolicy {
    /// Try each endpoint at most once.
    SinglePass,
    /// Keep rotating until an address is found or the token is cancelled.
    UntilFound,
}

/// Rotate through `rotation` until an endpoint returns an address of `version`.
pub async fn resolve_online(
    client: &Client,
    rotation: &UrlRotation,
    version: IpVersion,
    policy: ResolvePolicy,
    cancel: &CancellationToken,
) -> Option<IpAddr> {
    let mut attempts = 0usize;
    loop {
        if cancel.is_cancelled() {
            return None;
        }
        if policy == ResolvePolicy::SinglePass && attempts >= rotation.len() {
            return None;
        }
        attempts += 1;

        let url = rotation.next_url()?;
        match fetch_once(client, &url, version).await {
            Ok(ip) => {
                debug!("Resolved {} from {}", ip, url);
                return Some(ip);
            }
            Err(reason) => warn!("Online IP lookup via {} failed: {}", url, reason),
        }

        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(RETRY_PAUSE) => {}
        }
    }
}

async fn fetch_once(client: &Client, url: &str, version: IpVersion) -> Result<IpAddr, String> {
    let response = client.get(url).send().await.map_err(|e| e.to_string())?;
    let status = response.status();
    if !status.is_success() {
        return Err(format!("HTTP {}", status));
    }
    let body = response.text().await.map_err(|e| e.to_string())?;

    match extract_ip(&body, version) {
        Extracted::Match(ip) => Ok(ip),
        Extracted::Mismatch(ip) => Err(format!("returned {} but {} was requested", ip, version)),
        Extracted::Missing => Err("response contains no IP address".to_string()),
    }
}

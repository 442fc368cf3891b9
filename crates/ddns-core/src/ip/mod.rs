//! IP discovery and the shared IP cache.
//!
//! [`IpHelper`] resolves the host address with three strategies in priority
//! order (router, online endpoints, local interface), keeps the last result
//! cached, and refreshes it from a background task.

pub mod interface;
pub mod online;
pub mod router;

use std::net::IpAddr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{IpVersion, MikrotikConfig, Settings};
use crate::error::Result;
use crate::http::build_discovery_client;
use crate::traits::IpSource;

pub use online::{Extracted, ResolvePolicy, UrlRotation, extract_ip};

/// Discovery-relevant slice of [`Settings`].
#[derive(Debug, Clone)]
struct DiscoveryConfig {
    version: IpVersion,
    mikrotik: MikrotikConfig,
    interface: String,
    interval: Duration,
}

impl DiscoveryConfig {
    fn from_settings(settings: &Settings) -> Self {
        Self {
            version: settings.ip_type,
            mikrotik: settings.mikrotik.clone(),
            interface: settings.ip_interface.trim().to_string(),
            interval: Duration::from_secs(settings.interval.max(1)),
        }
    }
}

struct HelperState {
    config: DiscoveryConfig,
    online_client: Client,
    router_client: Client,
    current_ip: Option<IpAddr>,
}

/// Shared IP cache with a background refresher.
///
/// One instance lives for the whole process; reloads call
/// [`IpSource::update_configuration`] instead of rebuilding it.
pub struct IpHelper {
    state: RwLock<HelperState>,
    rotation: UrlRotation,
    first_resolution: Mutex<()>,
}

impl IpHelper {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            state: RwLock::new(HelperState {
                config: DiscoveryConfig::from_settings(settings),
                online_client: build_discovery_client(settings)?,
                router_client: router::build_router_client()?,
                current_ip: None,
            }),
            rotation: UrlRotation::new(settings.discovery_urls()),
            first_resolution: Mutex::new(()),
        })
    }

    /// Run the strategies in priority order and return the first address found.
    pub async fn resolve(&self, policy: ResolvePolicy, cancel: &CancellationToken) -> Option<IpAddr> {
        let (config, online_client, router_client) = {
            let state = self.read_state();
            (
                state.config.clone(),
                state.online_client.clone(),
                state.router_client.clone(),
            )
        };

        if config.mikrotik.enabled {
            match router::router_ip(&router_client, &config.mikrotik).await {
                Ok(ip) if config.version.matches(&ip) => return Some(ip),
                Ok(ip) => warn!("Router returned {} but {} was requested", ip, config.version),
                Err(e) => warn!("Router lookup failed: {}", e),
            }
        }

        if !self.rotation.is_empty() {
            if let Some(ip) =
                online::resolve_online(&online_client, &self.rotation, config.version, policy, cancel)
                    .await
            {
                return Some(ip);
            }
        }

        if !config.interface.is_empty() {
            match interface::interface_ip(&config.interface, config.version) {
                Ok(ip) => return Some(ip),
                Err(e) => warn!("Interface lookup failed: {}", e),
            }
        }

        None
    }

    /// Resolve once and store the result if one was found.
    pub async fn refresh(&self, policy: ResolvePolicy, cancel: &CancellationToken) -> Option<IpAddr> {
        let ip = self.resolve(policy, cancel).await?;
        let previous = self.write_state().current_ip.replace(ip);
        if previous != Some(ip) {
            info!("Current IP is now {}", ip);
        }
        Some(ip)
    }

    fn interval(&self) -> Duration {
        self.read_state().config.interval
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, HelperState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, HelperState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl IpSource for IpHelper {
    fn cached(&self) -> Option<IpAddr> {
        self.read_state().current_ip
    }

    async fn current(&self) -> Option<IpAddr> {
        if let Some(ip) = self.cached() {
            return Some(ip);
        }

        // Serialize first-use resolutions; later callers find the value cached.
        let _guard = self.first_resolution.lock().await;
        if let Some(ip) = self.cached() {
            return Some(ip);
        }
        debug!("No cached IP yet, resolving on demand");
        self.refresh(ResolvePolicy::SinglePass, &CancellationToken::new())
            .await
    }

    async fn update_configuration(&self, settings: &Settings) {
        let online_client = match build_discovery_client(settings) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!("Keeping previous discovery client: {}", e);
                None
            }
        };

        {
            let mut state = self.write_state();
            state.config = DiscoveryConfig::from_settings(settings);
            if let Some(client) = online_client {
                state.online_client = client;
            }
        }
        self.rotation.replace(settings.discovery_urls());
        debug!("IP discovery reconfigured ({} lookup URLs)", self.rotation.len());
    }

    fn start_refresh(self: Arc<Self>, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        Some(tokio::spawn(async move {
            info!("IP refresher started");
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                if self.refresh(ResolvePolicy::UntilFound, &cancel).await.is_none()
                    && !cancel.is_cancelled()
                {
                    warn!("Could not determine the current IP; keeping the previous value");
                }

                let interval = self.interval();
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            info!("IP refresher stopped");
        }))
    }
}

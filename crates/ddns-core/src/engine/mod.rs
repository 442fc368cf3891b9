//! Core DDNS engine
//!
//! The DdnsEngine runs one update pass for one domain:
//! - Reading the current IP from the shared IpSource
//! - Skipping the pass when the IP matches what was last applied
//! - Comparing each subdomain against live DNS
//! - Updating only the subdomains that differ via DnsProvider
//! - Firing the webhook per updated subdomain and one notification per pass
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  IpSource   │─── current IP ──────┐
//! └─────────────┘                     │
//!                                     ▼
//!                            ┌──────────────┐
//!                            │ DdnsEngine   │
//!                            └──────────────┘
//!                                     │
//!         ┌───────────────────────────┼───────────────────────────┐
//!         │                           │                           │
//!         ▼                           ▼                           ▼
//! ┌─────────────┐           ┌──────────────┐           ┌─────────────┐
//! │RecordLookup │           │ DnsProvider  │           │  Notifier / │
//! │ (compare)   │           │ (update)     │           │  Webhook    │
//! └─────────────┘           └──────────────┘           └─────────────┘
//! ```
//!
//! ## Failure routing
//!
//! Every error is routed with [`Error::disposition`]: lookup misses skip the
//! subdomain, provider failures end the pass, webhook and notification
//! failures are only logged. A pass that ends early leaves the cached IP
//! untouched, so the next tick retries it.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

use crate::config::{Domain, RunMode, Settings};
use crate::error::{Disposition, Error, Result};
use crate::traits::{DnsProvider, IpSource, Notifier, RecordLookup};
use crate::webhook::Webhook;

/// Events emitted by the DdnsEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A pass started for a domain
    PassStarted { domain: String },

    /// The current IP matches the last applied one; nothing was checked
    PassSkipped { domain: String, current_ip: IpAddr },

    /// No IP could be determined for this pass
    NoAddress { domain: String },

    /// Live DNS already holds the current IP
    SubdomainUnchanged { hostname: String, current_ip: IpAddr },

    /// The lookup found nothing (or failed) and the subdomain was skipped
    SubdomainSkipped { hostname: String, reason: String },

    /// The provider accepted the new IP
    SubdomainUpdated { hostname: String, new_ip: IpAddr },

    /// The pass ended early
    PassFailed { domain: String, error: String },

    /// The pass completed and the IP is now cached for the domain
    PassCompleted { domain: String, updated: Vec<String> },
}

/// What a completed pass did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// The IP matched the cached value
    Unchanged,
    /// No IP available (continuous mode only)
    NoAddress,
    /// Every subdomain was checked; `updated` lists those sent to the provider
    Applied { updated: Vec<String> },
}

/// Core DDNS engine
///
/// One engine serves every domain of a manager generation. It holds the
/// collaborators for that generation and the last IP successfully applied to
/// each domain.
///
/// ## Threading
///
/// Passes for different domains may run concurrently; each domain is driven
/// by a single task, so a domain never has two passes in flight.
pub struct DdnsEngine {
    settings: Arc<Settings>,
    mode: RunMode,

    ip_source: Arc<dyn IpSource>,
    lookup: Arc<dyn RecordLookup>,
    provider: Arc<dyn DnsProvider>,
    notifier: Arc<dyn Notifier>,
    webhook: Option<Webhook>,

    /// Last IP successfully applied, per domain name
    cached_ips: Mutex<HashMap<String, IpAddr>>,

    /// Event sender for external monitoring
    event_tx: Option<mpsc::Sender<EngineEvent>>,
}

impl DdnsEngine {
    /// Create a new DDNS engine
    ///
    /// # Parameters
    ///
    /// - `settings`: Snapshot of the generation's configuration
    /// - `ip_source`: Shared IP cache
    /// - `lookup`: Authoritative DNS lookup
    /// - `provider`: DNS provider created from `settings`
    /// - `notifier`: Notification fan-out
    pub fn new(
        settings: Arc<Settings>,
        ip_source: Arc<dyn IpSource>,
        lookup: Arc<dyn RecordLookup>,
        provider: Arc<dyn DnsProvider>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            mode: settings.run_mode(),
            settings,
            ip_source,
            lookup,
            provider,
            notifier,
            webhook: None,
            cached_ips: Mutex::new(HashMap::new()),
            event_tx: None,
        }
    }

    /// Fire `webhook` after each successful subdomain update
    pub fn with_webhook(mut self, webhook: Option<Webhook>) -> Self {
        self.webhook = webhook;
        self
    }

    /// Publish engine events on `tx`
    pub fn with_events(mut self, tx: mpsc::Sender<EngineEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Last IP applied to `domain`, if any
    pub async fn cached_ip(&self, domain: &str) -> Option<IpAddr> {
        self.cached_ips.lock().await.get(domain).copied()
    }

    /// Run one update pass for `domain`
    ///
    /// # Returns
    ///
    /// - `Ok(PassOutcome)`: The pass completed (possibly doing nothing)
    /// - `Err(Error)`: The pass ended early; the caller decides whether that
    ///   aborts the tick or the process via [`Error::disposition`]
    pub async fn update_ip(&self, domain: &Domain) -> Result<PassOutcome> {
        let name = &domain.domain_name;
        self.emit_event(EngineEvent::PassStarted {
            domain: name.clone(),
        });

        let Some(ip) = self.ip_source.current().await else {
            self.emit_event(EngineEvent::NoAddress {
                domain: name.clone(),
            });
            return match self.mode {
                RunMode::RunOnce => Err(self.fail_pass(name, Error::NoAddress)),
                RunMode::Continuous => {
                    warn!("No current IP for {}, will retry next tick", name);
                    Ok(PassOutcome::NoAddress)
                }
            };
        };

        if self.cached_ip(name).await == Some(ip) {
            debug!("IP {} unchanged for {}, skipping", ip, name);
            self.emit_event(EngineEvent::PassSkipped {
                domain: name.clone(),
                current_ip: ip,
            });
            return Ok(PassOutcome::Unchanged);
        }

        let mut updated = Vec::new();
        for subdomain in &domain.sub_domains {
            let hostname = domain.hostname(subdomain);

            match self.needs_update(&hostname, ip).await {
                Ok(false) => continue,
                Ok(true) => {}
                Err(e) => return Err(self.fail_pass(name, e)),
            }

            if let Err(e) = self.provider.update_ip(name, subdomain, ip).await {
                let err = Error::provider(
                    self.provider.provider_name(),
                    format!("updating {}: {}", hostname, e),
                );
                return Err(self.fail_pass(name, err));
            }

            info!("Updated {} -> {}", hostname, ip);
            self.emit_event(EngineEvent::SubdomainUpdated {
                hostname: hostname.clone(),
                new_ip: ip,
            });
            updated.push(subdomain.clone());

            if let Some(webhook) = &self.webhook {
                if let Err(e) = webhook.execute(&hostname, ip).await {
                    warn!("Webhook for {} failed: {}", hostname, e);
                }
            }
        }

        if !updated.is_empty() {
            self.notifier.notify(name, &updated, ip).await;
        }

        self.cached_ips.lock().await.insert(name.clone(), ip);
        self.emit_event(EngineEvent::PassCompleted {
            domain: name.clone(),
            updated: updated.clone(),
        });

        Ok(PassOutcome::Applied { updated })
    }

    /// Compare live DNS for `hostname` with `ip`
    ///
    /// `Ok(false)` means the subdomain is skipped, either because it already
    /// holds `ip` or because the lookup error is routed to `SkipSubdomain`.
    async fn needs_update(&self, hostname: &str, ip: IpAddr) -> Result<bool> {
        let lookup = self
            .lookup
            .lookup(hostname, self.settings.resolver_address(), self.settings.ip_type)
            .await;

        match lookup {
            Ok(current) if current == ip => {
                debug!("{} already resolves to {}", hostname, ip);
                self.emit_event(EngineEvent::SubdomainUnchanged {
                    hostname: hostname.to_string(),
                    current_ip: ip,
                });
                Ok(false)
            }
            Ok(current) => {
                debug!("{} resolves to {}, expected {}", hostname, current, ip);
                Ok(true)
            }
            Err(e) => {
                let err = Error::from(e);
                match err.disposition(self.mode) {
                    Disposition::SkipSubdomain => {
                        warn!("Skipping {}: {}", hostname, err);
                        self.emit_event(EngineEvent::SubdomainSkipped {
                            hostname: hostname.to_string(),
                            reason: err.to_string(),
                        });
                        Ok(false)
                    }
                    _ => Err(err),
                }
            }
        }
    }

    fn fail_pass(&self, domain: &str, err: Error) -> Error {
        error!("Update pass for {} aborted: {}", domain, err);
        self.emit_event(EngineEvent::PassFailed {
            domain: domain.to_string(),
            error: err.to_string(),
        });
        err
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        let Some(tx) = &self.event_tx else {
            return;
        };
        // A full channel means the consumer is lagging; drop rather than block a pass.
        if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(event) {
            warn!("Event channel full, dropping event");
        }
    }
}

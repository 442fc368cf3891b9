// # Notifier Trait
//
// Receives one message per update pass that changed at least one subdomain.

use std::net::IpAddr;

use async_trait::async_trait;

/// Fire-and-forget change notifications
///
/// Implementations log delivery failures themselves; nothing they do can
/// fail an update pass.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Announce that `subdomains` of `domain` now point at `ip`
    async fn notify(&self, domain: &str, subdomains: &[String], ip: IpAddr);
}

/// Notifier that drops every message
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, _domain: &str, _subdomains: &[String], _ip: IpAddr) {}
}

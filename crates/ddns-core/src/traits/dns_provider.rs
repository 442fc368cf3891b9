// # DNS Provider Trait
//
// Defines the interface for updating DNS records via provider APIs.
//
// ## Implementations
//
// - Cloudflare: `ddns-provider-cloudflare` crate
// - DuckDNS: `ddns-provider-duckdns` crate
//
// ## Usage
//
// ```rust,ignore
// use ddns_core::DnsProvider;
//
// let provider = registry.create_provider(&settings)?;
// provider.update_ip("example.com", "www", "203.0.113.7".parse()?).await?;
// ```

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Settings;

/// Trait for DNS provider implementations
///
/// This trait defines the interface for publishing an address for one
/// subdomain. Implementations must handle the specifics of each provider's API.
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks; one
/// instance serves every domain of a manager generation.
///
/// # Retries
///
/// Providers perform a single attempt and return an error on failure. The
/// engine abandons the pass and the next tick tries again.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Publish `ip` for `subdomain` under `domain`
    ///
    /// # Parameters
    ///
    /// - `domain`: The zone, e.g. `example.com`
    /// - `subdomain`: Label under the zone, or `@` for the apex
    /// - `ip`: Address to publish; its family selects `A` or `AAAA`
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The provider accepted the update
    /// - `Err(Error)`: If the update failed
    async fn update_ip(
        &self,
        domain: &str,
        subdomain: &str,
        ip: IpAddr,
    ) -> Result<(), crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS providers from configuration
pub trait DnsProviderFactory: Send + Sync {
    /// Create a DnsProvider instance from settings
    ///
    /// Fails when the credentials the provider needs are missing.
    fn create(&self, settings: &Settings) -> Result<Arc<dyn DnsProvider>, crate::Error>;
}

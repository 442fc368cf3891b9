//! Plugin-based provider registry
//!
//! The registry maps provider names to factories, so the configured
//! `provider` string selects an implementation without hardcoded if-else
//! chains. Names are matched case-insensitively (`"Cloudflare"` and
//! `"cloudflare"` are the same provider).
//!
//! ## Registration
//!
//! Implementations register themselves during daemon start-up:
//!
//! ```rust,ignore
//! // In ddns-provider-cloudflare crate
//! pub fn register(registry: &ProviderRegistry) {
//!     registry.register_provider("cloudflare", Box::new(CloudflareFactory));
//! }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::traits::{DnsProvider, DnsProviderFactory};

/// Provider registry for plugin-based DNS provider creation
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Box<dyn DnsProviderFactory>>>,
}

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a DNS provider factory
    ///
    /// # Parameters
    ///
    /// - `name`: Provider name (e.g., "cloudflare", "duckdns")
    /// - `factory`: Factory object for creating provider instances
    pub fn register_provider(&self, name: &str, factory: Box<dyn DnsProviderFactory>) {
        let mut providers = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        providers.insert(normalize(name), factory);
    }

    /// Create the provider named by `settings.provider`
    ///
    /// # Returns
    ///
    /// - `Ok(Arc<dyn DnsProvider>)`: Created provider instance
    /// - `Err(Error::Config)`: If the name is not registered or creation fails
    pub fn create_provider(&self, settings: &Settings) -> Result<Arc<dyn DnsProvider>> {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);

        let factory = providers.get(&normalize(&settings.provider)).ok_or_else(|| {
            Error::config(format!("Unknown provider type: {}", settings.provider))
        })?;

        factory.create(settings)
    }

    /// List all registered provider names
    pub fn list_providers(&self) -> Vec<String> {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a provider name is registered
    pub fn has_provider(&self, name: &str) -> bool {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        providers.contains_key(&normalize(name))
    }
}

// # IP Source Trait
//
// Defines the interface for obtaining the host's current IP address.
//
// ## Implementations
//
// - `IpHelper` (`ddns_core::ip`): router → online URLs → interface, with a
//   background refresher keeping a cached value warm
// - Test doubles in `tests/common`
//
// ## Usage
//
// ```rust,ignore
// use ddns_core::IpSource;
//
// let source: Arc<dyn IpSource> = Arc::new(IpHelper::new(&settings)?);
// let refresher = source.clone().start_refresh(shutdown.child_token());
//
// if let Some(ip) = source.current().await {
//     println!("current IP: {ip}");
// }
// ```

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Settings;

/// Trait for IP source implementations
///
/// Implementations must be thread-safe: every per-domain task of a manager
/// generation and the control panel read from the same instance.
#[async_trait]
pub trait IpSource: Send + Sync {
    /// Get the current IP address
    ///
    /// Returns the cached value when one exists. When nothing has been
    /// resolved yet, implementations may perform one bounded resolution
    /// before answering; they must never block indefinitely.
    ///
    /// # Returns
    ///
    /// - `Some(IpAddr)`: The current IP address
    /// - `None`: No address could be determined
    async fn current(&self) -> Option<IpAddr>;

    /// Last known address, without ever starting a resolution
    ///
    /// For readers that must not wait on the network, such as the control
    /// panel. `None` means nothing has been resolved yet.
    fn cached(&self) -> Option<IpAddr>;

    /// Apply a new configuration snapshot
    ///
    /// Called by the manager before every generation starts. Must be safe to
    /// call while a resolution is in flight.
    async fn update_configuration(&self, _settings: &Settings) {}

    /// Start the background refresher, if this source has one
    ///
    /// The returned task must exit promptly once `cancel` fires.
    fn start_refresh(self: Arc<Self>, _cancel: CancellationToken) -> Option<JoinHandle<()>> {
        None
    }
}

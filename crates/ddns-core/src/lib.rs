// # ddns-core
//
// Core library for the DDNS updater.
//
// ## Architecture Overview
//
// This library provides the core functionality for dynamic DNS updates:
// - **IpHelper**: Discovers the current IP (router → online URLs → interface)
//   and keeps it cached behind a background refresher
// - **DnsResolver**: Looks records up in live DNS to avoid redundant updates
// - **DnsProvider**: Trait for updating DNS records via provider APIs
// - **DdnsEngine**: Runs one update pass for one domain
// - **DnsManager**: Schedules passes per domain, reloads on config changes,
//   and shuts everything down deterministically
// - **ProviderRegistry**: Name → factory lookup table for DNS providers
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Discovery, comparison, and publication are
//    separate components behind traits
// 2. **Owned State**: No globals; the manager owns and injects every
//    collaborator
// 3. **Plugin-Based**: Providers are registered by name, no hard-coded if-else
// 4. **Library-First**: The daemon is a thin shell around this crate
// 5. **Idempotency**: Live DNS is consulted before every provider call

pub mod config;
pub mod dns;
pub mod engine;
pub mod error;
pub mod http;
pub mod ip;
pub mod manager;
pub mod notification;
pub mod registry;
pub mod template;
pub mod traits;
pub mod webhook;

// Re-export core types for convenience
pub use config::{Domain, IpVersion, RunMode, Settings};
pub use dns::DnsResolver;
pub use engine::{DdnsEngine, EngineEvent, PassOutcome};
pub use error::{Disposition, Error, LookupError, Result};
pub use ip::IpHelper;
pub use manager::{DnsManager, ManagerState, ReloadHandle};
pub use notification::NotificationManager;
pub use registry::ProviderRegistry;
pub use traits::{ControlPanel, DnsProvider, DnsProviderFactory, IpSource, Notifier, PanelContext, RecordLookup};
pub use webhook::Webhook;

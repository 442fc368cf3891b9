//! Core traits for the DDNS system
//!
//! This module defines the seams between the update pipeline and its
//! collaborators. Every trait object is shared behind `Arc` by the per-domain
//! tasks of a manager generation.
//!
//! - [`IpSource`]: Current public/interface IP, cached and refreshed
//! - [`RecordLookup`]: Authoritative DNS lookup used for change detection
//! - [`DnsProvider`]: Update DNS records via provider APIs
//! - [`Notifier`]: Fan-out of "records changed" messages
//! - [`ControlPanel`]: Embedded HTTP panel bound to a manager generation

pub mod ip_source;
pub mod record_lookup;
pub mod dns_provider;
pub mod notifier;
pub mod control_panel;

pub use ip_source::IpSource;
pub use record_lookup::RecordLookup;
pub use dns_provider::{DnsProvider, DnsProviderFactory};
pub use notifier::{Notifier, NullNotifier};
pub use control_panel::{ControlPanel, PanelContext};

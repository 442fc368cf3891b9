// # Record Lookup Trait
//
// Queries live DNS for the address a hostname currently resolves to, so the
// engine can skip provider calls when the published record is already right.

use std::net::IpAddr;

use async_trait::async_trait;

use crate::config::IpVersion;
use crate::error::LookupError;

/// Authoritative DNS lookup
#[async_trait]
pub trait RecordLookup: Send + Sync {
    /// Resolve `hostname` to an address of the given family
    ///
    /// # Parameters
    ///
    /// - `hostname`: Fully-qualified name to look up
    /// - `resolver`: Explicit DNS server (`ip` or `ip:port`); `None` uses the
    ///   system resolver
    /// - `version`: Selects `A` or `AAAA` records
    ///
    /// # Returns
    ///
    /// - `Ok(IpAddr)`: First address of the requested family
    /// - `Err(LookupError::NotFound | LookupError::Empty)`: Nothing published
    /// - `Err(LookupError::Transport)`: Resolver unreachable after retries
    async fn lookup(
        &self,
        hostname: &str,
        resolver: Option<&str>,
        version: IpVersion,
    ) -> Result<IpAddr, LookupError>;
}

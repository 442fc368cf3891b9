//! Authoritative lookups used to detect whether a record already holds the
//! address we are about to publish.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::rr::{RData, RecordType};
use hickory_proto::xfer::Protocol;
use hickory_resolver::Resolver;
use hickory_resolver::config::{NameServerConfig, ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use tracing::{debug, warn};

use crate::config::IpVersion;
use crate::error::LookupError;
use crate::traits::RecordLookup;

/// Default DNS port appended to resolvers given without one.
pub const DNS_PORT: u16 = 53;

/// Attempts per configured server before giving up on a query.
pub const RETRY_MULTIPLIER: usize = 5;

const QUERY_TIMEOUT: Duration = Duration::from_secs(3);

/// Looks hostnames up through the system resolver or an explicit server.
#[derive(Debug, Default, Clone, Copy)]
pub struct DnsResolver;

impl DnsResolver {
    pub fn new() -> Self {
        Self
    }
}

/// Parse `ip` or `ip:port` (IPv6 as `[ip]:port`), defaulting to port 53.
pub fn parse_resolver(resolver: &str) -> Result<SocketAddr, LookupError> {
    let resolver = resolver.trim();
    if let Ok(addr) = resolver.parse::<SocketAddr>() {
        return Ok(addr);
    }
    resolver
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, DNS_PORT))
        .map_err(|_| LookupError::InvalidResolver(resolver.to_string()))
}

fn record_type(version: IpVersion) -> RecordType {
    match version {
        IpVersion::V4 => RecordType::A,
        IpVersion::V6 => RecordType::AAAA,
    }
}

async fn lookup_system(hostname: &str, version: IpVersion) -> Result<IpAddr, LookupError> {
    // The system resolver cannot tell NXDOMAIN from an outage, so any failure
    // is reported as a missing record.
    let addrs = tokio::net::lookup_host((hostname, 0))
        .await
        .map_err(|e| {
            debug!("System lookup of {} failed: {}", hostname, e);
            LookupError::NotFound {
                hostname: hostname.to_string(),
            }
        })?;

    addrs
        .map(|sa| sa.ip())
        .find(|ip| version.matches(ip))
        .ok_or_else(|| LookupError::Empty {
            hostname: hostname.to_string(),
        })
}

async fn lookup_with_server(
    hostname: &str,
    server: SocketAddr,
    version: IpVersion,
) -> Result<IpAddr, LookupError> {
    let name_servers = vec![NameServerConfig::new(server, Protocol::Udp)];
    let server_count = name_servers.len();
    let config = ResolverConfig::from_parts(None, vec![], name_servers);

    let mut opts = ResolverOpts::default();
    opts.attempts = 1;
    opts.cache_size = 0;
    opts.timeout = QUERY_TIMEOUT;

    let resolver = Resolver::builder_with_config(config, TokioConnectionProvider::default())
        .with_options(opts)
        .build();

    let rtype = record_type(version);
    let max_attempts = RETRY_MULTIPLIER * server_count;
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        match resolver.lookup(hostname, rtype).await {
            Ok(lookup) => {
                return lookup
                    .iter()
                    .find_map(|rdata| match rdata {
                        RData::A(a) => Some(IpAddr::V4(a.0)),
                        RData::AAAA(aaaa) => Some(IpAddr::V6(aaaa.0)),
                        _ => None,
                    })
                    .ok_or_else(|| LookupError::Empty {
                        hostname: hostname.to_string(),
                    });
            }
            Err(e) if e.is_nx_domain() => {
                return Err(LookupError::NotFound {
                    hostname: hostname.to_string(),
                });
            }
            Err(e) if e.is_no_records_found() => {
                return Err(LookupError::Empty {
                    hostname: hostname.to_string(),
                });
            }
            Err(e) => {
                debug!(
                    "Lookup of {} via {} failed (attempt {}/{}): {}",
                    hostname, server, attempt, max_attempts, e
                );
                last_error = e.to_string();
            }
        }
    }

    warn!("Giving up on {} via {}: {}", hostname, server, last_error);
    Err(LookupError::Transport {
        hostname: hostname.to_string(),
        message: last_error,
    })
}

#[async_trait]
impl RecordLookup for DnsResolver {
    async fn lookup(
        &self,
        hostname: &str,
        resolver: Option<&str>,
        version: IpVersion,
    ) -> Result<IpAddr, LookupError> {
        match resolver {
            None => lookup_system(hostname, version).await,
            Some(resolver) => {
                let server = parse_resolver(resolver)?;
                lookup_with_server(hostname, server, version).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolver_port_defaults_to_53() {
        assert_eq!(
            parse_resolver("1.1.1.1").unwrap(),
            "1.1.1.1:53".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            parse_resolver("9.9.9.9:5353").unwrap(),
            "9.9.9.9:5353".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            parse_resolver("2606:4700::1111").unwrap(),
            "[2606:4700::1111]:53".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn hostnames_are_not_resolver_addresses() {
        assert_eq!(
            parse_resolver("dns.example"),
            Err(LookupError::InvalidResolver("dns.example".into()))
        );
    }

    #[tokio::test]
    async fn invalid_resolver_fails_without_network() {
        let err = DnsResolver::new()
            .lookup("example.com", Some("not-an-ip"), IpVersion::V4)
            .await
            .unwrap_err();
        assert!(matches!(err, LookupError::InvalidResolver(_)));
    }

    #[tokio::test]
    async fn system_lookup_of_localhost() {
        let ip = DnsResolver::new()
            .lookup("localhost", None, IpVersion::V4)
            .await
            .unwrap();
        assert!(ip.is_loopback());
    }
}

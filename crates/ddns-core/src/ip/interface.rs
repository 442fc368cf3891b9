//! Read the address of a local network interface.

use std::net::IpAddr;

use crate::config::IpVersion;
use crate::error::{Error, Result};

/// Pick the first publicly routable address of the requested family.
pub fn select_interface_ip(addrs: &[IpAddr], version: IpVersion) -> Option<IpAddr> {
    addrs
        .iter()
        .copied()
        .find(|ip| version.matches(ip) && is_publishable(ip))
}

fn is_publishable(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast())
        }
        IpAddr::V6(v6) => {
            !(v6.is_loopback()
                || v6.is_unspecified()
                || v6.is_unique_local()
                || v6.is_unicast_link_local())
        }
    }
}

/// Address of `interface` suitable for publishing.
pub fn interface_ip(interface: &str, version: IpVersion) -> Result<IpAddr> {
    let addrs = list_addresses(interface)?;
    select_interface_ip(&addrs, version).ok_or_else(|| {
        Error::ip_source(format!(
            "interface {} has no public {} address",
            interface, version
        ))
    })
}

fn list_addresses(interface: &str) -> Result<Vec<IpAddr>> {
    let addrs: Vec<IpAddr> = if_addrs::get_if_addrs()?
        .into_iter()
        .filter(|iface| iface.name == interface)
        .map(|iface| iface.ip())
        .collect();

    // Every listed entry carries an address, so no entry means no interface.
    if addrs.is_empty() {
        return Err(Error::ip_source(format!("interface {interface} not found")));
    }
    Ok(addrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ips(list: &[&str]) -> Vec<IpAddr> {
        list.iter().map(|s| s.parse().unwrap()).collect()
    }

    #[test]
    fn skips_private_and_link_local() {
        let addrs = ips(&[
            "127.0.0.1",
            "192.168.1.10",
            "169.254.0.3",
            "fe80::1",
            "fd00::5",
            "203.0.113.7",
            "2001:db8::7",
        ]);
        assert_eq!(
            select_interface_ip(&addrs, IpVersion::V4),
            Some("203.0.113.7".parse().unwrap())
        );
        assert_eq!(
            select_interface_ip(&addrs, IpVersion::V6),
            Some("2001:db8::7".parse().unwrap())
        );
    }

    #[test]
    fn nothing_publishable_yields_none() {
        let addrs = ips(&["10.0.0.2", "fe80::2"]);
        assert_eq!(select_interface_ip(&addrs, IpVersion::V4), None);
        assert_eq!(select_interface_ip(&addrs, IpVersion::V6), None);
    }

    #[test]
    fn unknown_interface_is_an_error() {
        let err = interface_ip("ddns-test-no-such-if0", IpVersion::V4).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}

use if_addrs::{get_if_addrs, IfAddr};
use ipnet::Ipv4Net;
use std::net::{IpAddr, Ipv4Addr};
use tracing::debug;

use crate::error::ResolveError;

/// Find the address this machine uses on the local network.
///
/// Interfaces are taken in the order the OS reports them; the first IPv4
/// address that is not loopback wins. Called again on every scan cycle so a
/// network change between cycles is picked up.
pub fn resolve_host_address() -> Result<Ipv4Addr, ResolveError> {
    let ifaces = get_if_addrs().map_err(ResolveError::Interfaces)?;
    let host = first_non_loopback(ifaces.into_iter().map(|iface| match iface.addr {
        IfAddr::V4(v4) => IpAddr::V4(v4.ip),
        IfAddr::V6(v6) => IpAddr::V6(v6.ip),
    }))
    .ok_or(ResolveError::NoAddressFound)?;
    debug!(%host, "resolved host address");
    Ok(host)
}

/// Pick the first IPv4 address that is not loopback.
pub fn first_non_loopback(addrs: impl IntoIterator<Item = IpAddr>) -> Option<Ipv4Addr> {
    addrs.into_iter().find_map(|addr| match addr {
        IpAddr::V4(v4) if !v4.is_loopback() => Some(v4),
        _ => None,
    })
}

/// Helper: convert an IPv4 address into its default /24 network.
pub fn ipv4_to_default_cidr(ip: Ipv4Addr) -> Ipv4Net {
    let o = ip.octets();
    let net = Ipv4Addr::new(o[0], o[1], o[2], 0);
    Ipv4Net::new(net, 24).expect("/24 is always valid")
}

/// Host addresses of a network, without the network and broadcast addresses.
pub fn expand_hosts(net: Ipv4Net) -> Vec<Ipv4Addr> {
    let start = u32::from(net.network());
    let end = u32::from(net.broadcast());
    if end <= start + 1 {
        // Too small to have host addresses
        return Vec::new();
    }
    (start + 1..end).map(Ipv4Addr::from).collect()
}

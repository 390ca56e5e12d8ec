use std::net::{IpAddr, SocketAddr};

/// Host part of a possibly fully-qualified name (`pve01.lan` -> `pve01`).
pub fn short_name(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

/// Validates a guest address reported by the hypervisor.
///
/// Returns `None` for anything that is not a plain IP address, including the
/// `No value set!` placeholder some guests report.
pub fn parse_guest_address(raw: &str) -> Option<IpAddr> {
    raw.trim().parse::<IpAddr>().ok()
}

/// Addresses handed out by the hypervisor's internal NAT network identify an
/// isolated guest network and are never synced.
pub fn is_nat_address(addr: &IpAddr, nat_prefix: &str) -> bool {
    !nat_prefix.is_empty() && addr.to_string().starts_with(nat_prefix)
}

/// Drops an explicit port from a host address (`10.0.0.5:2222`, `[fd00::5]:2222`).
/// Bare IPv6 addresses and names without a port come back unchanged.
pub fn host_only(address: &str) -> String {
    if let Ok(socket) = address.parse::<SocketAddr>() {
        return socket.ip().to_string();
    }
    match address.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && port.parse::<u16>().is_ok() => host.to_string(),
        _ => address.to_string(),
    }
}

/// Renders an address in the `address/prefix` form the inventory stores.
pub fn with_prefix_len(addr: &IpAddr, prefix_len: u8) -> String {
    format!("{addr}/{prefix_len}")
}

//! `nmap` ARP ping sweep.
//!
//! ```text
//! Nmap scan report for 192.168.178.1
//! Host is up (0.0012s latency).
//! MAC Address: AA:BB:CC:DD:EE:FF (AVM GmbH)
//! Nmap scan report for nas.lan (192.168.178.20)
//! Host is up (0.00050s latency).
//! MAC Address: 00:11:22:33:44:55 (Synology)
//! Nmap scan report for 192.168.178.5
//! Host is up.
//! ```
//!
//! The scanning host reports itself without a MAC line, so a MAC is only ever
//! paired with the report directly above it.

use std::net::IpAddr;

use infrasync_common::models::NeighborRecord;

pub const PROGRAM: &str = "nmap";

const REPORT_PREFIX: &str = "Nmap scan report for ";
const MAC_PREFIX: &str = "MAC Address: ";

/// Host discovery only, by ARP, with raw ethernet frames.
pub fn sweep_args(subnet: &str) -> Vec<String> {
    ["-sn", "-PR", "--send-eth", subnet]
        .into_iter()
        .map(str::to_string)
        .collect()
}

pub fn parse_sweep(raw: &str) -> Vec<NeighborRecord> {
    let mut neighbors = Vec::new();
    let mut pending: Option<IpAddr> = None;

    for line in raw.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix(REPORT_PREFIX) {
            pending = report_address(rest);
            continue;
        }
        let Some(rest) = line.strip_prefix(MAC_PREFIX) else {
            continue;
        };
        let (Some(address), Some(mac)) = (pending.take(), rest.split_whitespace().next().and_then(normalize_mac))
        else {
            continue;
        };
        neighbors.push(NeighborRecord { address, mac });
    }
    neighbors
}

// `192.168.178.20` or `nas.lan (192.168.178.20)`.
fn report_address(rest: &str) -> Option<IpAddr> {
    let candidate = match rest.rsplit_once('(') {
        Some((_, inner)) => inner.trim_end_matches(')'),
        None => rest,
    };
    candidate.trim().parse().ok()
}

/// Upper-cases a MAC and checks it has six hex octets.
pub fn normalize_mac(raw: &str) -> Option<String> {
    let octets: Vec<&str> = raw.split([':', '-']).collect();
    let valid = octets.len() == 6
        && octets
            .iter()
            .all(|octet| octet.len() == 2 && octet.chars().all(|c| c.is_ascii_hexdigit()));
    valid.then(|| octets.join(":").to_ascii_uppercase())
}

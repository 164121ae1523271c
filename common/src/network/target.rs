//! # Probe Target Model
//!
//! Defines the addresses an address-probing discovery strategy visits.
//!
//! A target is written as:
//! * A single IP address (`192.168.1.5`).
//! * An IPv4 range (`192.168.1.1-100` or `192.168.1.1-192.168.1.100`).
//! * A CIDR block (`192.168.1.0/24`).
//! * The keyword `lan`, resolved to the primary private network.

use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use tracing::{info, warn};

use crate::network::interface;
use crate::network::range::{self, IpCollection, Ipv4Range};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeTarget {
    /// Every usable address of the local area network.
    Lan,
    Host { target_addr: IpAddr },
    Range { ipv4_range: Ipv4Range },
}

impl FromStr for ProbeTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if s.eq_ignore_ascii_case("lan") {
            return Ok(ProbeTarget::Lan);
        }

        if let Ok(target_addr) = s.parse::<IpAddr>() {
            return Ok(ProbeTarget::Host { target_addr });
        }

        if let Some(target) = parse_ip_range(s)? {
            return Ok(target);
        }

        if let Some(target) = parse_cidr_range(s)? {
            return Ok(target);
        }

        Err(format!("invalid target: {s}"))
    }
}

impl<'de> Deserialize<'de> for ProbeTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

fn resolve_target(target: &ProbeTarget, collection: &mut IpCollection) -> anyhow::Result<()> {
    match target {
        ProbeTarget::Lan => {
            let Some(net) = interface::get_lan_network()? else {
                anyhow::bail!("LAN interface has no private IPv4 network");
            };
            let net_u32: u32 = u32::from(net.network());
            let broadcast_u32: u32 = u32::from(net.broadcast());

            // Usable range excludes network and broadcast
            let start_u32 = net_u32.saturating_add(1);
            let end_u32 = broadcast_u32.saturating_sub(1);

            if start_u32 <= end_u32 {
                let (start_ip, end_ip) = (Ipv4Addr::from(start_u32), Ipv4Addr::from(end_u32));
                info!("Probing LAN from {start_ip} to {end_ip}");
                collection.add_range(Ipv4Range::new(start_ip, end_ip));
            } else {
                warn!("Network too small to strip broadcast, probing full range.");
                collection.add_range(Ipv4Range::new(net.network(), net.broadcast()));
            }
        }
        ProbeTarget::Host { target_addr } => collection.add_single(*target_addr),
        ProbeTarget::Range { ipv4_range } => collection.add_range(*ipv4_range),
    }
    Ok(())
}

/// Expands targets into the set of addresses to probe.
pub fn to_collection(targets: &[ProbeTarget]) -> anyhow::Result<IpCollection> {
    let mut collection = IpCollection::new();
    for target in targets {
        resolve_target(target, &mut collection)?;
    }

    anyhow::ensure!(
        collection.len() <= range::MAX_SWEEP_ADDRESSES,
        "{} addresses exceed the sweep limit of {}",
        collection.len(),
        range::MAX_SWEEP_ADDRESSES
    );

    Ok(collection)
}

/// Parses a range string like "1.1.1.1-2.2.2.2" or "1.1.1.1-50".
fn parse_ip_range(s: &str) -> Result<Option<ProbeTarget>, String> {
    let Some((start_str, end_str)) = s.split_once('-') else {
        return Ok(None);
    };

    let start_addr = start_str
        .parse::<Ipv4Addr>()
        .map_err(|e| format!("Invalid start IP in range '{start_str}': {e}"))?;

    let end_addr = parse_range_end_addr(end_str, &start_addr, s)?;

    let ipv4_range = Ipv4Range::new(start_addr, end_addr);
    Ok(Some(ProbeTarget::Range { ipv4_range }))
}

/// Handles abbreviated forms like "192.168.1.1-50" (implies 192.168.1.50)
/// and full forms like "192.168.1.1-192.168.1.255".
fn parse_range_end_addr(
    end_str: &str,
    start_addr: &Ipv4Addr,
    original_s: &str,
) -> Result<Ipv4Addr, String> {
    if let Ok(full_addr) = end_str.parse::<Ipv4Addr>() {
        return Ok(full_addr);
    }

    if end_str.is_empty() {
        return Err(format!("End range cannot be empty: {original_s}"));
    }

    let partial_octets: Vec<u8> = end_str
        .split('.')
        .map(|octet_str| octet_str.parse::<u8>())
        .collect::<Result<Vec<u8>, _>>()
        .map_err(|e| format!("Invalid end range '{end_str}': {e}"))?;

    if partial_octets.len() > 4 {
        return Err(format!("End range has too many octets: {end_str}"));
    }

    let mut end_octets = start_addr.octets();
    let start_index = 4 - partial_octets.len();
    end_octets[start_index..].copy_from_slice(&partial_octets);

    Ok(Ipv4Addr::from(end_octets))
}

/// Parses CIDR notation like "192.168.1.0/24".
fn parse_cidr_range(s: &str) -> Result<Option<ProbeTarget>, String> {
    let Some((ip_str, prefix_str)) = s.split_once('/') else {
        return Ok(None);
    };

    let ipv4_addr = ip_str
        .parse::<Ipv4Addr>()
        .map_err(|e| format!("Invalid IP in CIDR '{ip_str}': {e}"))?;

    let prefix = prefix_str
        .parse::<u8>()
        .map_err(|e| format!("Invalid prefix in CIDR '{prefix_str}': {e}"))?;

    let ipv4_range = range::cidr_range(ipv4_addr, prefix).map_err(|e| e.to_string())?;

    Ok(Some(ProbeTarget::Range { ipv4_range }))
}

//! Host neighbour table lookups.
//!
//! A probed host that answered has an ARP entry on the host afterwards, so
//! its MAC address can be read back without raw sockets.

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use pnet::util::MacAddr;

pub const PROC_ARP: &str = "/proc/net/arp";

/// Flag set on completed ARP entries.
const ATF_COM: u32 = 0x2;

pub trait NeighborTable: Send + Sync {
    fn snapshot(&self) -> io::Result<HashMap<IpAddr, MacAddr>>;

    fn lookup(&self, ip: IpAddr) -> io::Result<Option<MacAddr>> {
        Ok(self.snapshot()?.get(&ip).copied())
    }
}

/// Reads the kernel's ARP cache.
pub struct ProcNeighborTable {
    path: PathBuf,
}

impl ProcNeighborTable {
    pub fn new() -> Self {
        Self {
            path: PathBuf::from(PROC_ARP),
        }
    }
}

impl Default for ProcNeighborTable {
    fn default() -> Self {
        Self::new()
    }
}

impl NeighborTable for ProcNeighborTable {
    fn snapshot(&self) -> io::Result<HashMap<IpAddr, MacAddr>> {
        let raw = std::fs::read_to_string(&self.path)?;
        Ok(parse_arp_table(&raw))
    }
}

/// A fixed table, for hosts without a readable neighbour cache.
#[derive(Debug, Clone, Default)]
pub struct StaticNeighborTable(pub HashMap<IpAddr, MacAddr>);

impl NeighborTable for StaticNeighborTable {
    fn snapshot(&self) -> io::Result<HashMap<IpAddr, MacAddr>> {
        Ok(self.0.clone())
    }
}

pub fn parse_arp_table(raw: &str) -> HashMap<IpAddr, MacAddr> {
    raw.lines()
        .skip(1)
        .filter_map(|line| {
            let mut columns = line.split_whitespace();
            let ip: Ipv4Addr = columns.next()?.parse().ok()?;
            let _hw_type = columns.next()?;
            let flags = u32::from_str_radix(columns.next()?.trim_start_matches("0x"), 16).ok()?;
            let mac: MacAddr = columns.next()?.parse().ok()?;
            (flags & ATF_COM != 0 && mac != MacAddr::zero()).then_some((IpAddr::V4(ip), mac))
        })
        .collect()
}

use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr};

/// Upper bound on addresses a single probe sweep will expand to (a /16).
pub const MAX_SWEEP_ADDRESSES: usize = 65_536;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Range {
    pub start_addr: Ipv4Addr,
    pub end_addr: Ipv4Addr,
}

impl Ipv4Range {
    pub fn new(start_addr: Ipv4Addr, end_addr: Ipv4Addr) -> Self {
        Self {
            start_addr,
            end_addr,
        }
    }

    pub fn to_iter(&self) -> impl Iterator<Item = IpAddr> {
        let start: u32 = self.start_addr.into();
        let end: u32 = self.end_addr.into();
        (start..=end).map(|ip| IpAddr::V4(Ipv4Addr::from(ip)))
    }

    pub fn len(&self) -> usize {
        let start: u32 = self.start_addr.into();
        let end: u32 = self.end_addr.into();
        end.checked_sub(start).map_or(0, |d| d as usize + 1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn cidr_range(ip: Ipv4Addr, prefix: u8) -> anyhow::Result<Ipv4Range> {
    let network = pnet::ipnetwork::Ipv4Network::new(ip, prefix)?;
    let start = network.network();
    let end = network.broadcast();

    Ok(Ipv4Range::new(start, end))
}

/// Addresses an address-probing sweep will visit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpCollection {
    pub singles: BTreeSet<IpAddr>,
    pub ranges: Vec<Ipv4Range>,
}

impl IpCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_single(&mut self, ip: IpAddr) {
        self.singles.insert(ip);
    }

    pub fn add_range(&mut self, range: Ipv4Range) {
        self.ranges.push(range);
    }

    pub fn len(&self) -> usize {
        self.singles.len() + self.ranges.iter().map(Ipv4Range::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every distinct address, singles first, in ascending order.
    pub fn addresses(&self) -> BTreeSet<IpAddr> {
        let mut all: BTreeSet<IpAddr> = self.singles.clone();
        for range in &self.ranges {
            all.extend(range.to_iter());
        }
        all
    }
}

impl IntoIterator for IpCollection {
    type Item = IpAddr;
    type IntoIter = std::collections::btree_set::IntoIter<IpAddr>;

    fn into_iter(self) -> Self::IntoIter {
        self.addresses().into_iter()
    }
}

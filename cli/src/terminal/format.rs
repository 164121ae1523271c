use std::net::{IpAddr, Ipv6Addr};

use crate::terminal::colors;
use colored::*;
use hubkit_common::device::DeviceRecord;
use hubkit_common::discovery::{DiscoveryDetails, DiscoveryResult};

pub type Detail = (String, ColoredString);

pub fn ipv6_to_type_str(ipv6_addr: &Ipv6Addr) -> &'static str {
    let first_byte = ipv6_addr.octets()[0];
    if (0x20..=0x3F).contains(&first_byte) {
        return "GUA";
    }
    if ipv6_addr.is_unique_local() {
        return "ULA";
    }
    if ipv6_addr.is_unicast_link_local() {
        return "LLA";
    }
    "IPv6"
}

pub fn ip_to_detail(ip: &IpAddr) -> Detail {
    match ip {
        IpAddr::V4(ipv4_addr) => (String::from("IPv4"), ipv4_addr.to_string().color(colors::IPV4_ADDR)),
        IpAddr::V6(ipv6_addr) => (
            String::from(ipv6_to_type_str(ipv6_addr)),
            ipv6_addr.to_string().color(colors::IPV6_ADDR),
        ),
    }
}

/// The tree rows printed under a discovered device.
pub fn result_to_details(result: &DiscoveryResult) -> Vec<Detail> {
    let mut details: Vec<Detail> = vec![("Kind".to_string(), result.kind().to_string().normal())];
    if let Some(ip) = &result.address {
        details.push(ip_to_detail(ip));
    }

    match &result.details {
        DiscoveryDetails::Mac { mac, vendor } => {
            details.push(("MAC".to_string(), mac.to_string().color(colors::MAC_ADDR)));
            if let Some(vendor) = vendor {
                details.push(("Vendor".to_string(), vendor.color(colors::VENDOR)));
            }
        }
        DiscoveryDetails::MdnsSd { fullname, host, port, txt, .. } => {
            details.push(("Service".to_string(), fullname.normal()));
            if let Some(host) = host {
                details.push(("Host".to_string(), host.normal()));
            }
            if let Some(port) = port {
                details.push(("Port".to_string(), port.to_string().normal()));
            }
            for (key, value) in txt {
                details.push((format!("txt.{key}"), value.dimmed()));
            }
        }
        DiscoveryDetails::Ssdp { location, usn, .. } => {
            if let Some(location) = location {
                details.push(("Location".to_string(), location.normal()));
            }
            if let Some(usn) = usn {
                details.push(("USN".to_string(), usn.dimmed()));
            }
        }
    }
    details
}

pub fn record_to_details(record: &DeviceRecord) -> Vec<Detail> {
    let data = record.data.iter().map(|(key, value)| (format!("data.{key}"), value.color(colors::ACCENT)));
    let store = record
        .store
        .iter()
        .map(|(key, value)| (format!("store.{key}"), value.to_string().normal()));
    data.chain(store).collect()
}

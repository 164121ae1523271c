use anyhow::{Context, Result};
use dns_parser::{Packet, RData, ResourceRecord};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    net::IpAddr,
};

/// One announced service instance, e.g. `Hue Bridge - 1A2B3C._hue._tcp.local`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ServiceInstance {
    /// Instance label without the service type.
    pub name: String,
    pub fullname: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Keys are lower-cased; flag entries without `=` map to an empty value.
    pub txt: BTreeMap<String, String>,
    pub ips: BTreeSet<IpAddr>,
}

/// Extracts every instance of `service_type` announced in an mDNS response.
///
/// Records may arrive in the answer or additional sections in any order.
pub fn extract_instances(data: &[u8], service_type: &str) -> Result<Vec<ServiceInstance>> {
    let packet = Packet::parse(data).context("failed to parse mDNS packet")?;
    let service_type = normalize(service_type);

    let records: Vec<&ResourceRecord> = packet
        .answers
        .iter()
        .chain(packet.additional.iter())
        .collect();

    let mut instances: Vec<ServiceInstance> = Vec::new();
    for record in &records {
        if let RData::PTR(ptr) = &record.data
            && normalize(&record.name.to_string()).eq_ignore_ascii_case(&service_type)
        {
            let fullname = normalize(&ptr.0.to_string());
            if instances.iter().all(|i| !i.fullname.eq_ignore_ascii_case(&fullname)) {
                instances.push(ServiceInstance {
                    name: instance_label(&fullname, &service_type),
                    fullname,
                    ..ServiceInstance::default()
                });
            }
        }
    }

    let mut host_ips: HashMap<String, BTreeSet<IpAddr>> = HashMap::new();
    for record in &records {
        let owner = normalize(&record.name.to_string());
        match &record.data {
            RData::A(a) => {
                host_ips.entry(owner.to_ascii_lowercase()).or_default().insert(IpAddr::V4(a.0));
            }
            RData::AAAA(aaaa) => {
                host_ips.entry(owner.to_ascii_lowercase()).or_default().insert(IpAddr::V6(aaaa.0));
            }
            RData::SRV(srv) => {
                if let Some(instance) = instances.iter_mut().find(|i| i.fullname.eq_ignore_ascii_case(&owner)) {
                    instance.host = Some(normalize(&srv.target.to_string()));
                    instance.port = Some(srv.port);
                }
            }
            RData::TXT(txt) => {
                if let Some(instance) = instances.iter_mut().find(|i| i.fullname.eq_ignore_ascii_case(&owner)) {
                    for entry in txt.iter() {
                        if let Some((key, value)) = parse_txt_entry(entry) {
                            instance.txt.insert(key, value);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    for instance in &mut instances {
        let host = instance.host.as_deref().map(str::to_ascii_lowercase);
        if let Some(ips) = host.and_then(|host| host_ips.get(&host)) {
            instance.ips.extend(ips.iter().copied());
        }
    }

    Ok(instances)
}

fn normalize(name: &str) -> String {
    name.trim_end_matches('.').to_string()
}

fn instance_label(fullname: &str, service_type: &str) -> String {
    let Some(split) = fullname.len().checked_sub(service_type.len() + 1) else {
        return fullname.to_string();
    };
    match (fullname.get(..split), fullname.get(split..)) {
        (Some(label), Some(rest))
            if !label.is_empty()
                && rest
                    .strip_prefix('.')
                    .is_some_and(|ty| ty.eq_ignore_ascii_case(service_type)) =>
        {
            label.to_string()
        }
        _ => fullname.to_string(),
    }
}

fn parse_txt_entry(entry: &[u8]) -> Option<(String, String)> {
    let text = std::str::from_utf8(entry).ok()?;
    let (key, value) = text.split_once('=').unwrap_or((text, ""));
    if key.is_empty() {
        return None;
    }
    Some((key.to_ascii_lowercase(), value.to_string()))
}

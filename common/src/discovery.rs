//! # Discovery Models
//!
//! Results produced by discovery strategies and the configuration that
//! selects a strategy.
//!
//! Strategy configs use the JSON shape hub apps already ship in their
//! manifests:
//!
//! ```json
//! { "type": "mdns-sd", "mdns-sd": { "name": "hue", "protocol": "tcp" }, "id": "{{txt.bridgeid}}" }
//! { "type": "ssdp", "ssdp": { "search": "urn:schemas-upnp-org:device:basic:1" }, "id": "{{headers.usn}}" }
//! { "type": "mac", "mac": { "manufacturer": [[0, 23, 136]], "targets": ["192.168.1.0/24"] } }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::time::SystemTime;

use pnet::util::MacAddr;
use serde::{Deserialize, Serialize};

use crate::error::HubError;
use crate::network::mac::MacPrefix;
use crate::network::target::ProbeTarget;

/// The strategy family a result or config belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveryKind {
    Mac,
    MdnsSd,
    Ssdp,
}

impl fmt::Display for DiscoveryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mac => "mac",
            Self::MdnsSd => "mdns-sd",
            Self::Ssdp => "ssdp",
        })
    }
}

/// Variant specific attributes of a [`DiscoveryResult`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DiscoveryDetails {
    Mac {
        #[serde(serialize_with = "serialize_mac")]
        mac: MacAddr,
        vendor: Option<String>,
    },
    MdnsSd {
        name: String,
        fullname: String,
        host: Option<String>,
        port: Option<u16>,
        txt: BTreeMap<String, String>,
    },
    Ssdp {
        location: Option<String>,
        usn: Option<String>,
        port: Option<u16>,
        headers: BTreeMap<String, String>,
    },
}

fn serialize_mac<S: serde::Serializer>(mac: &MacAddr, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(mac)
}

/// A candidate device found by one discovery strategy.
///
/// Values are never mutated. A newer sighting of the same `id` produces a new
/// value that replaces the old one in the run's snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryResult {
    pub id: String,
    pub address: Option<IpAddr>,
    pub last_seen: SystemTime,
    #[serde(flatten)]
    pub details: DiscoveryDetails,
}

impl DiscoveryResult {
    pub fn kind(&self) -> DiscoveryKind {
        match self.details {
            DiscoveryDetails::Mac { .. } => DiscoveryKind::Mac,
            DiscoveryDetails::MdnsSd { .. } => DiscoveryKind::MdnsSd,
            DiscoveryDetails::Ssdp { .. } => DiscoveryKind::Ssdp,
        }
    }

    /// Looks up an attribute by the path syntax used in id templates.
    ///
    /// Supported paths: `address`, `mac`, `vendor`, `name`, `fullname`,
    /// `host`, `port`, `txt.<key>`, `location`, `usn`, `headers.<key>`.
    pub fn attribute(&self, path: &str) -> Option<String> {
        if path == "address" {
            return self.address.map(|ip| ip.to_string());
        }

        match &self.details {
            DiscoveryDetails::Mac { mac, vendor } => match path {
                "mac" => Some(mac.to_string()),
                "vendor" => vendor.clone(),
                _ => None,
            },
            DiscoveryDetails::MdnsSd {
                name,
                fullname,
                host,
                port,
                txt,
            } => match path {
                "name" => Some(name.clone()),
                "fullname" => Some(fullname.clone()),
                "host" => host.clone(),
                "port" => port.map(|p| p.to_string()),
                _ => path
                    .strip_prefix("txt.")
                    .and_then(|key| txt.get(&key.to_ascii_lowercase()).cloned()),
            },
            DiscoveryDetails::Ssdp {
                location,
                usn,
                port,
                headers,
            } => match path {
                "location" => location.clone(),
                "usn" => usn.clone(),
                "port" => port.map(|p| p.to_string()),
                _ => path
                    .strip_prefix("headers.")
                    .and_then(|key| headers.get(&key.to_ascii_lowercase()).cloned()),
            },
        }
    }
}

/// Selects which attribute identifies a result, written as `{{txt.id}}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdTemplate {
    path: String,
}

impl IdTemplate {
    pub fn parse(raw: &str) -> Result<Self, HubError> {
        let inner = raw
            .trim()
            .strip_prefix("{{")
            .and_then(|s| s.strip_suffix("}}"))
            .unwrap_or(raw)
            .trim();

        if inner.is_empty() {
            return Err(HubError::invalid_config(format!("empty id template '{raw}'")));
        }
        Ok(Self {
            path: inner.to_string(),
        })
    }

    pub fn default_for(kind: DiscoveryKind) -> Self {
        let path = match kind {
            DiscoveryKind::Mac => "mac",
            DiscoveryKind::MdnsSd => "name",
            DiscoveryKind::Ssdp => "usn",
        };
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Resolves the identifier for a result, if the attribute is present.
    pub fn resolve(&self, result: &DiscoveryResult) -> Option<String> {
        result.attribute(&self.path).filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MdnsProtocol {
    #[default]
    Tcp,
    Udp,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MdnsSdConfig {
    /// Service name without underscores, e.g. `hue` for `_hue._tcp.local`.
    pub name: String,
    #[serde(default)]
    pub protocol: MdnsProtocol,
}

impl MdnsSdConfig {
    /// The fully qualified service type, e.g. `_hue._tcp.local`.
    pub fn service_type(&self) -> String {
        let protocol = match self.protocol {
            MdnsProtocol::Tcp => "tcp",
            MdnsProtocol::Udp => "udp",
        };
        format!("_{}._{}.local", self.name.trim_start_matches('_'), protocol)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SsdpConfig {
    /// The ST header of the M-SEARCH request.
    pub search: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MacConfig {
    /// Empty means any responding device matches.
    #[serde(default)]
    pub manufacturer: Vec<MacPrefix>,
    #[serde(default = "default_targets")]
    pub targets: Vec<ProbeTarget>,
    #[serde(default = "default_ports")]
    pub ports: Vec<u16>,
}

fn default_targets() -> Vec<ProbeTarget> {
    vec![ProbeTarget::Lan]
}

fn default_ports() -> Vec<u16> {
    vec![80, 443]
}

/// Strategy specific settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategySettings {
    MdnsSd(MdnsSdConfig),
    Ssdp(SsdpConfig),
    Mac(MacConfig),
}

/// A validated discovery strategy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawStrategyConfig")]
pub struct StrategyConfig {
    pub settings: StrategySettings,
    pub id: IdTemplate,
}

impl StrategyConfig {
    pub fn kind(&self) -> DiscoveryKind {
        match self.settings {
            StrategySettings::MdnsSd(_) => DiscoveryKind::MdnsSd,
            StrategySettings::Ssdp(_) => DiscoveryKind::Ssdp,
            StrategySettings::Mac(_) => DiscoveryKind::Mac,
        }
    }

    pub fn mdns_sd(name: impl Into<String>, protocol: MdnsProtocol) -> Self {
        Self {
            settings: StrategySettings::MdnsSd(MdnsSdConfig {
                name: name.into(),
                protocol,
            }),
            id: IdTemplate::default_for(DiscoveryKind::MdnsSd),
        }
    }

    pub fn ssdp(search: impl Into<String>) -> Self {
        Self {
            settings: StrategySettings::Ssdp(SsdpConfig {
                search: search.into(),
            }),
            id: IdTemplate::default_for(DiscoveryKind::Ssdp),
        }
    }

    pub fn mac(config: MacConfig) -> Self {
        Self {
            settings: StrategySettings::Mac(config),
            id: IdTemplate::default_for(DiscoveryKind::Mac),
        }
    }

    pub fn with_id(mut self, id: IdTemplate) -> Self {
        self.id = id;
        self
    }

    pub fn from_json(raw: &str) -> Result<Self, HubError> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[derive(Deserialize)]
struct RawStrategyConfig {
    #[serde(rename = "type")]
    kind: DiscoveryKind,
    #[serde(rename = "mdns-sd")]
    mdns_sd: Option<MdnsSdConfig>,
    ssdp: Option<SsdpConfig>,
    mac: Option<MacConfig>,
    id: Option<String>,
}

impl TryFrom<RawStrategyConfig> for StrategyConfig {
    type Error = HubError;

    fn try_from(raw: RawStrategyConfig) -> Result<Self, Self::Error> {
        let missing = |section: &str| {
            HubError::invalid_config(format!("strategy of type '{}' lacks its '{section}' section", raw.kind))
        };

        let settings = match raw.kind {
            DiscoveryKind::MdnsSd => StrategySettings::MdnsSd(raw.mdns_sd.clone().ok_or_else(|| missing("mdns-sd"))?),
            DiscoveryKind::Ssdp => StrategySettings::Ssdp(raw.ssdp.clone().ok_or_else(|| missing("ssdp"))?),
            DiscoveryKind::Mac => StrategySettings::Mac(raw.mac.clone().ok_or_else(|| missing("mac"))?),
        };

        let id = match raw.id.as_deref() {
            Some(template) => IdTemplate::parse(template)?,
            None => IdTemplate::default_for(raw.kind),
        };

        Ok(Self { settings, id })
    }
}

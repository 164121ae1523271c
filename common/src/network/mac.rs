use std::fmt;
use std::str::FromStr;

use pnet::util::MacAddr;
use serde::{Deserialize, Deserializer};

/// A manufacturer filter for MAC discovery.
///
/// Either the first three bytes (the OUI) or a complete six byte address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MacPrefix(Vec<u8>);

impl MacPrefix {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, String> {
        match bytes.len() {
            3 | 6 => Ok(Self(bytes)),
            n => Err(format!("MAC prefix must have 3 or 6 bytes, got {n}")),
        }
    }

    pub fn matches(&self, mac: &MacAddr) -> bool {
        let octets: [u8; 6] = mac.octets();
        octets.starts_with(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for MacPrefix {
    type Err = String;

    /// Accepts `00:17:88` or `00-17-88-aa-bb-cc`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: Vec<u8> = s
            .split([':', '-'])
            .map(|part| {
                if part.len() != 2 {
                    return Err(format!("invalid MAC octet '{part}' in '{s}'"));
                }
                u8::from_str_radix(part, 16).map_err(|e| format!("invalid MAC octet '{part}': {e}"))
            })
            .collect::<Result<_, _>>()?;
        Self::from_bytes(bytes)
    }
}

impl fmt::Display for MacPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|b| format!("{b:02x}")).collect();
        write!(f, "{}", parts.join(":"))
    }
}

/// Manifests store prefixes as decimal byte arrays, the CLI as strings.
impl<'de> Deserialize<'de> for MacPrefix {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bytes(Vec<u8>),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Bytes(bytes) => MacPrefix::from_bytes(bytes),
            Raw::Text(text) => text.parse(),
        }
        .map_err(serde::de::Error::custom)
    }
}

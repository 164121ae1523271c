//! # Device Record Model
//!
//! The shape returned by a driver's device enumeration callback and the
//! durable identity of a paired device.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::HubError;

/// Opaque identifiers of a device. Immutable once the device exists.
pub type DeviceData = BTreeMap<String, String>;

/// Mutable runtime hints such as the last known address.
pub type DeviceStore = Map<String, Value>;

/// A device candidate, and after pairing the persistent identity of a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub name: String,
    pub data: DeviceData,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub store: DeviceStore,
}

impl DeviceRecord {
    pub fn new(name: impl Into<String>, data: DeviceData) -> Self {
        Self {
            name: name.into(),
            data,
            store: Map::new(),
        }
    }

    pub fn with_store_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.store.insert(key.into(), value.into());
        self
    }

    /// The conventional `data.id` entry, when present.
    pub fn id(&self) -> Option<&str> {
        self.data.get("id").map(String::as_str)
    }

    /// A record without `data` cannot key a device.
    pub fn validate(&self) -> Result<(), HubError> {
        if self.data.is_empty() {
            return Err(HubError::pairing_failed(format!(
                "device '{}' has no data identifiers",
                self.name
            )));
        }
        Ok(())
    }
}

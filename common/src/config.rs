//! Runtime configuration and the app manifest.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::discovery::StrategyConfig;
use crate::error::HubError;

pub const MANIFEST_FILE: &str = "app.json";

/// Timeouts and output settings shared by the engine and the CLI.
#[derive(Debug, Clone)]
pub struct Config {
    /// How long announcement listeners (mDNS-SD, SSDP) stay open.
    pub listen_window: Duration,
    /// Bound on a single address probe.
    pub probe_timeout: Duration,
    /// Maximum number of address probes in flight.
    pub probe_concurrency: usize,
    /// How long a pairing session waits for the UI to pick a candidate.
    pub selection_timeout: Duration,
    /// How long listing waits for discovery results before calling the driver.
    pub listing_grace: Duration,
    /// 0 prints everything, 1 drops decoration, 2 prints results only.
    pub quiet: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_window: Duration::from_secs(5),
            probe_timeout: Duration::from_millis(250),
            probe_concurrency: 64,
            selection_timeout: Duration::from_secs(300),
            listing_grace: Duration::from_secs(2),
            quiet: 0,
        }
    }
}

/// The `app.json` manifest of an integration app.
#[derive(Debug, Clone, Deserialize)]
pub struct AppManifest {
    pub id: String,
    #[serde(default)]
    pub drivers: Vec<DriverManifest>,
    /// Discovery strategies keyed by strategy id.
    #[serde(default)]
    pub discovery: BTreeMap<String, StrategyConfig>,
    /// Widget API endpoints keyed by handler name.
    #[serde(default)]
    pub api: BTreeMap<String, ApiRouteManifest>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DriverManifest {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Id of an entry in [`AppManifest::discovery`].
    #[serde(default)]
    pub discovery: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiRouteManifest {
    pub method: String,
    pub path: String,
}

impl AppManifest {
    pub fn from_json(raw: &str) -> Result<Self, HubError> {
        let manifest: Self = serde_json::from_str(raw)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Reads `app.json` from an app directory.
    pub fn load(app_dir: &Path) -> Result<Self, HubError> {
        let raw = std::fs::read_to_string(app_dir.join(MANIFEST_FILE))?;
        Self::from_json(&raw)
    }

    pub fn driver(&self, id: &str) -> Option<&DriverManifest> {
        self.drivers.iter().find(|driver| driver.id == id)
    }

    /// The discovery strategy a driver links to, if any.
    pub fn strategy_for(&self, driver_id: &str) -> Option<&StrategyConfig> {
        let strategy_id = self.driver(driver_id)?.discovery.as_deref()?;
        self.discovery.get(strategy_id)
    }

    fn validate(&self) -> Result<(), HubError> {
        let mut seen = std::collections::HashSet::new();
        for driver in &self.drivers {
            if !seen.insert(driver.id.as_str()) {
                return Err(HubError::invalid_config(format!("duplicate driver id '{}'", driver.id)));
            }
            if let Some(strategy) = &driver.discovery
                && !self.discovery.contains_key(strategy)
            {
                return Err(HubError::invalid_config(format!(
                    "driver '{}' links unknown discovery strategy '{strategy}'",
                    driver.id
                )));
            }
        }
        Ok(())
    }
}

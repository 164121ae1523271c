//! # Discovery binding
//!
//! Connects live discovery results to a driver's paired devices. Each result
//! is offered to every ready device. The first sighting a device claims makes
//! it available; later sightings report an address change or a refresh.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use hubkit_common::device::DeviceData;
use hubkit_common::discovery::DiscoveryResult;
use tracing::{debug, warn};

use crate::discovery::DiscoveryRun;
use crate::instance::{DeviceInstance, DriverInstance, InitState};

/// What a sighting did to one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingOutcome {
    Available { device: String },
    Unavailable { device: String, message: String },
    AddressChanged { device: String, previous: Option<IpAddr> },
    LastSeen { device: String },
}

pub struct DiscoveryBinder {
    driver: Arc<DriverInstance>,
    bound: HashMap<DeviceData, Option<IpAddr>>,
}

impl DiscoveryBinder {
    pub fn new(driver: Arc<DriverInstance>) -> Self {
        Self {
            driver,
            bound: HashMap::new(),
        }
    }

    /// Offers one result to every ready device of the driver.
    pub async fn offer(&mut self, result: &DiscoveryResult) -> Vec<BindingOutcome> {
        let mut outcomes = Vec::new();
        for device in self.driver.devices() {
            if device.init_state() != InitState::Ready {
                continue;
            }
            if let Some(outcome) = self.offer_to(&device, result).await {
                outcomes.push(outcome);
            }
        }
        outcomes
    }

    /// Feeds every event of `run` through [`offer`](Self::offer) until the sweep ends.
    pub async fn follow(mut self, mut run: DiscoveryRun) -> Self {
        while let Some(event) = run.next().await {
            let outcomes = self.offer(event.result()).await;
            debug!(target: "hubkit::binding", driver = %self.driver.id(), id = %event.result().id, matched = outcomes.len(), "sighting offered");
        }
        self
    }

    async fn offer_to(&mut self, device: &DeviceInstance, result: &DiscoveryResult) -> Option<BindingOutcome> {
        let hooks = Arc::clone(device.hooks());
        let _guard = device.gate().lock().await;
        if !hooks.on_discovery_result(device, result) {
            return None;
        }
        let name = device.name().to_string();

        let Some(previous) = self.bound.get(device.data()).copied() else {
            let outcome = match hooks.on_discovery_available(device, result).await {
                Ok(()) => {
                    device.set_available();
                    BindingOutcome::Available { device: name }
                }
                Err(e) => {
                    let message = format!("{e:#}");
                    warn!(target: "hubkit::binding", device = %name, "discovery available hook failed: {message}");
                    device.set_unavailable(message.clone());
                    BindingOutcome::Unavailable { device: name, message }
                }
            };
            // A device that failed stays unbound so the next sighting retries it.
            if matches!(outcome, BindingOutcome::Available { .. }) {
                self.bound.insert(device.data().clone(), result.address);
            }
            return Some(outcome);
        };

        if previous != result.address {
            self.bound.insert(device.data().clone(), result.address);
            if let Err(e) = hooks.on_discovery_address_changed(device, result, previous).await {
                warn!(target: "hubkit::binding", device = %name, "address change hook failed: {e:#}");
            }
            return Some(BindingOutcome::AddressChanged { device: name, previous });
        }

        if let Err(e) = hooks.on_discovery_last_seen_changed(device, result).await {
            warn!(target: "hubkit::binding", device = %name, "last seen hook failed: {e:#}");
        }
        Some(BindingOutcome::LastSeen { device: name })
    }
}

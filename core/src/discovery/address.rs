//! Address probing.
//!
//! Sweeps a set of addresses with bounded TCP connect probes. Every host
//! that answers is looked up in the neighbour table and reported under its
//! MAC address when the MAC matches a configured manufacturer prefix.

use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use hubkit_common::config::Config;
use hubkit_common::discovery::{DiscoveryDetails, DiscoveryKind, DiscoveryResult, MacConfig};
use hubkit_common::network::range::IpCollection;
use hubkit_common::network::target;
use pnet::util::MacAddr;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, trace};

use super::Strategy;
use crate::network::neighbors::NeighborTable;
use crate::network::tcp::Prober;
use crate::vendors::VendorLookup;

pub struct AddressProbe {
    config: MacConfig,
    targets: IpCollection,
    probe_timeout: Duration,
    concurrency: usize,
    prober: Arc<dyn Prober>,
    neighbors: Arc<dyn NeighborTable>,
    vendors: Arc<dyn VendorLookup>,
}

impl AddressProbe {
    pub fn new(
        config: MacConfig,
        runtime: &Config,
        prober: Arc<dyn Prober>,
        neighbors: Arc<dyn NeighborTable>,
        vendors: Arc<dyn VendorLookup>,
    ) -> Self {
        Self {
            config,
            targets: IpCollection::new(),
            probe_timeout: runtime.probe_timeout,
            concurrency: runtime.probe_concurrency.max(1),
            prober,
            neighbors,
            vendors,
        }
    }

    fn accepts(&self, mac: &MacAddr) -> bool {
        self.config.manufacturer.is_empty()
            || self.config.manufacturer.iter().any(|prefix| prefix.matches(mac))
    }

    fn sighting(&self, ip: IpAddr) -> Option<DiscoveryResult> {
        let mac = match self.neighbors.lookup(ip) {
            Ok(Some(mac)) => mac,
            Ok(None) => {
                trace!(target: "hubkit::discovery::mac", %ip, "no neighbour entry");
                return None;
            }
            Err(e) => {
                debug!(target: "hubkit::discovery::mac", %ip, "neighbour lookup failed: {e}");
                return None;
            }
        };
        if !self.accepts(&mac) {
            trace!(target: "hubkit::discovery::mac", %ip, %mac, "manufacturer filtered");
            return None;
        }

        Some(DiscoveryResult {
            id: String::new(),
            address: Some(ip),
            last_seen: SystemTime::now(),
            details: DiscoveryDetails::Mac {
                mac,
                vendor: self.vendors.vendor(mac),
            },
        })
    }
}

#[async_trait]
impl Strategy for AddressProbe {
    fn kind(&self) -> DiscoveryKind {
        DiscoveryKind::Mac
    }

    async fn bind(&mut self) -> io::Result<()> {
        self.targets = target::to_collection(&self.config.targets)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("{e:#}")))?;
        self.neighbors.snapshot()?;
        debug!(target: "hubkit::discovery::mac", targets = self.targets.len(), "address sweep bound");
        Ok(())
    }

    async fn sweep(&mut self, sink: mpsc::Sender<DiscoveryResult>) {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut probes = JoinSet::new();

        for ip in std::mem::take(&mut self.targets) {
            let permits = Arc::clone(&permits);
            let prober = Arc::clone(&self.prober);
            let ports = self.config.ports.clone();
            let limit = self.probe_timeout;
            probes.spawn(async move {
                let _permit = permits.acquire_owned().await.ok()?;
                prober.probe(ip, &ports, limit).await.then_some(ip)
            });
        }

        while let Some(joined) = probes.join_next().await {
            let Ok(Some(ip)) = joined else { continue };
            if let Some(result) = self.sighting(ip)
                && sink.send(result).await.is_err()
            {
                return;
            }
        }
    }
}

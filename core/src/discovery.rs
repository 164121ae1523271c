//! # Discovery Engine
//!
//! Runs one discovery strategy per [`DiscoveryRun`].
//!
//! A strategy first binds its listening mechanism. Failing to bind is the
//! only error a run surfaces, as [`HubError::DiscoveryUnavailable`]. After
//! that the sweep runs as a background task and pushes raw sightings into
//! the run, which keys them through the strategy's id template and merges
//! repeated sightings of the same id.
//!
//! Runs are not restartable. Dropping a run aborts its sweep task, which
//! drops the strategy and closes its sockets.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use hubkit_common::HubError;
use hubkit_common::config::Config;
use hubkit_common::discovery::{
    DiscoveryKind, DiscoveryResult, IdTemplate, StrategyConfig, StrategySettings,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::network::neighbors::{NeighborTable, ProcNeighborTable};
use crate::network::tcp::{HandshakeProber, Prober};
use crate::vendors::{MacOuiRepo, VendorLookup};

pub mod address;
pub mod mdns;
pub mod ssdp;

use address::AddressProbe;
use mdns::MdnsSdListener;
use ssdp::SsdpListener;

const SIGHTING_BUFFER: usize = 256;

/// What a run reports for each keyed sighting.
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    /// First sighting of an id in this run.
    Found(Arc<DiscoveryResult>),
    /// A later sighting. The snapshot now holds `result`.
    Updated {
        result: Arc<DiscoveryResult>,
        address_changed: bool,
    },
}

impl DiscoveryEvent {
    pub fn result(&self) -> &Arc<DiscoveryResult> {
        match self {
            Self::Found(result) | Self::Updated { result, .. } => result,
        }
    }
}

/// One discovery mechanism.
#[async_trait]
pub trait Strategy: Send + 'static {
    fn kind(&self) -> DiscoveryKind;

    /// Acquires sockets or tables the sweep needs.
    async fn bind(&mut self) -> io::Result<()>;

    /// Pushes raw sightings until the sweep is over or the sink closes.
    ///
    /// Sightings carry no `id`; the run assigns it.
    async fn sweep(&mut self, sink: mpsc::Sender<DiscoveryResult>);
}

/// Builds strategies from configs and starts runs.
pub struct DiscoveryEngine {
    config: Config,
    prober: Arc<dyn Prober>,
    neighbors: Arc<dyn NeighborTable>,
    vendors: Arc<dyn VendorLookup>,
}

impl DiscoveryEngine {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            prober: Arc::new(HandshakeProber),
            neighbors: Arc::new(ProcNeighborTable::new()),
            vendors: Arc::new(MacOuiRepo),
        }
    }

    pub fn with_prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = prober;
        self
    }

    pub fn with_neighbors(mut self, neighbors: Arc<dyn NeighborTable>) -> Self {
        self.neighbors = neighbors;
        self
    }

    pub fn with_vendors(mut self, vendors: Arc<dyn VendorLookup>) -> Self {
        self.vendors = vendors;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn strategy(&self, config: &StrategyConfig) -> Box<dyn Strategy> {
        match &config.settings {
            StrategySettings::Mac(mac) => Box::new(AddressProbe::new(
                mac.clone(),
                &self.config,
                Arc::clone(&self.prober),
                Arc::clone(&self.neighbors),
                Arc::clone(&self.vendors),
            )),
            StrategySettings::MdnsSd(mdns) => {
                Box::new(MdnsSdListener::new(mdns, self.config.listen_window))
            }
            StrategySettings::Ssdp(ssdp) => Box::new(SsdpListener::new(ssdp, self.config.listen_window)),
        }
    }

    /// Starts a fresh sweep for `config`.
    pub async fn run(&self, config: &StrategyConfig) -> Result<DiscoveryRun, HubError> {
        DiscoveryRun::start(self.strategy(config), config.id.clone()).await
    }
}

/// A lazily consumed, merged stream of sightings from one sweep.
pub struct DiscoveryRun {
    kind: DiscoveryKind,
    template: IdTemplate,
    rx: mpsc::Receiver<DiscoveryResult>,
    task: JoinHandle<()>,
    merged: Vec<Arc<DiscoveryResult>>,
    slots: HashMap<String, usize>,
}

impl DiscoveryRun {
    pub async fn start(mut strategy: Box<dyn Strategy>, template: IdTemplate) -> Result<Self, HubError> {
        let kind = strategy.kind();
        strategy
            .bind()
            .await
            .map_err(|e| HubError::discovery_unavailable(kind.to_string(), e))?;
        debug!(target: "hubkit::discovery", %kind, id = template.path(), "sweep started");

        let (tx, rx) = mpsc::channel(SIGHTING_BUFFER);
        let task = tokio::spawn(async move {
            strategy.sweep(tx).await;
            debug!(target: "hubkit::discovery", %kind, "sweep finished");
        });

        Ok(Self {
            kind,
            template,
            rx,
            task,
            merged: Vec::new(),
            slots: HashMap::new(),
        })
    }

    pub fn kind(&self) -> DiscoveryKind {
        self.kind
    }

    /// The next keyed sighting, or `None` once the sweep is over.
    pub async fn next(&mut self) -> Option<DiscoveryEvent> {
        loop {
            let raw = self.rx.recv().await?;
            if let Some(event) = self.merge(raw) {
                return Some(event);
            }
        }
    }

    /// Like [`next`](Self::next) but only consumes sightings already received.
    pub fn try_next(&mut self) -> Option<DiscoveryEvent> {
        while let Ok(raw) = self.rx.try_recv() {
            if let Some(event) = self.merge(raw) {
                return Some(event);
            }
        }
        None
    }

    /// The merged snapshot in first-seen order. One entry per id.
    pub fn results(&self) -> &[Arc<DiscoveryResult>] {
        &self.merged
    }

    /// Drains the sweep to its end and returns the merged snapshot.
    pub async fn collect(mut self) -> Vec<Arc<DiscoveryResult>> {
        while self.next().await.is_some() {}
        std::mem::take(&mut self.merged)
    }

    /// Stops the sweep and waits until its resources are released.
    pub async fn cancel(mut self) {
        self.task.abort();
        let _ = (&mut self.task).await;
        debug!(target: "hubkit::discovery", kind = %self.kind, "sweep cancelled");
    }

    fn merge(&mut self, mut raw: DiscoveryResult) -> Option<DiscoveryEvent> {
        let Some(id) = self.template.resolve(&raw) else {
            trace!(target: "hubkit::discovery", path = self.template.path(), "sighting without id dropped");
            return None;
        };
        raw.id = id;

        match self.slots.get(&raw.id) {
            Some(&slot) => {
                let previous = &self.merged[slot];
                if raw.address.is_none() {
                    raw.address = previous.address;
                }
                let address_changed = previous.address != raw.address;
                let result = Arc::new(raw);
                self.merged[slot] = Arc::clone(&result);
                Some(DiscoveryEvent::Updated {
                    result,
                    address_changed,
                })
            }
            None => {
                let result = Arc::new(raw);
                self.slots.insert(result.id.clone(), self.merged.len());
                self.merged.push(Arc::clone(&result));
                Some(DiscoveryEvent::Found(result))
            }
        }
    }
}

impl Drop for DiscoveryRun {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use hubkit_common::discovery::DiscoveryDetails;
    use std::collections::BTreeMap;
    use std::net::IpAddr;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, SystemTime};

    /// Emits a canned list of sightings, then optionally stays open.
    pub(crate) struct ScriptedStrategy {
        pub sightings: Vec<DiscoveryResult>,
        pub fail_bind: bool,
        pub linger: bool,
        pub released: Arc<AtomicBool>,
    }

    impl ScriptedStrategy {
        pub(crate) fn new(sightings: Vec<DiscoveryResult>) -> Self {
            Self {
                sightings,
                fail_bind: false,
                linger: false,
                released: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl Drop for ScriptedStrategy {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Strategy for ScriptedStrategy {
        fn kind(&self) -> DiscoveryKind {
            DiscoveryKind::MdnsSd
        }

        async fn bind(&mut self) -> io::Result<()> {
            if self.fail_bind {
                return Err(io::Error::new(io::ErrorKind::AddrInUse, "port taken"));
            }
            Ok(())
        }

        async fn sweep(&mut self, sink: mpsc::Sender<DiscoveryResult>) {
            for sighting in self.sightings.drain(..) {
                if sink.send(sighting).await.is_err() {
                    return;
                }
            }
            if self.linger {
                std::future::pending::<()>().await;
            }
        }
    }

    pub(crate) fn announcement(name: &str, address: Option<&str>) -> DiscoveryResult {
        DiscoveryResult {
            id: String::new(),
            address: address.map(|a| a.parse::<IpAddr>().unwrap()),
            last_seen: SystemTime::now(),
            details: DiscoveryDetails::MdnsSd {
                name: name.to_string(),
                fullname: format!("{name}._hue._tcp.local"),
                host: None,
                port: Some(443),
                txt: BTreeMap::new(),
            },
        }
    }

    fn by_name() -> IdTemplate {
        IdTemplate::default_for(DiscoveryKind::MdnsSd)
    }

    #[tokio::test]
    async fn repeated_sightings_merge_by_id() {
        let strategy = ScriptedStrategy::new(vec![
            announcement("bridge-a", Some("192.168.1.20")),
            announcement("bridge-b", Some("192.168.1.21")),
            announcement("bridge-a", Some("192.168.1.20")),
            announcement("bridge-a", Some("192.168.1.30")),
        ]);
        let mut run = DiscoveryRun::start(Box::new(strategy), by_name()).await.unwrap();

        let mut events = Vec::new();
        while let Some(event) = run.next().await {
            events.push(event);
        }

        assert!(matches!(events[0], DiscoveryEvent::Found(_)));
        assert!(matches!(events[1], DiscoveryEvent::Found(_)));
        assert!(matches!(events[2], DiscoveryEvent::Updated { address_changed: false, .. }));
        assert!(matches!(events[3], DiscoveryEvent::Updated { address_changed: true, .. }));

        let results = run.results();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "bridge-a");
        assert_eq!(results[0].address, "192.168.1.30".parse().ok());
    }

    #[tokio::test]
    async fn missing_address_keeps_the_known_one() {
        let strategy = ScriptedStrategy::new(vec![
            announcement("bridge-a", Some("192.168.1.20")),
            announcement("bridge-a", None),
        ]);
        let results = DiscoveryRun::start(Box::new(strategy), by_name())
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].address, "192.168.1.20".parse().ok());
    }

    #[tokio::test]
    async fn unkeyed_sightings_are_dropped() {
        let strategy = ScriptedStrategy::new(vec![announcement("bridge-a", None)]);
        let template = IdTemplate::parse("{{txt.bridgeid}}").unwrap();
        let results = DiscoveryRun::start(Box::new(strategy), template)
            .await
            .unwrap()
            .collect()
            .await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn bind_failure_is_unavailable() {
        let mut strategy = ScriptedStrategy::new(Vec::new());
        strategy.fail_bind = true;
        let err = DiscoveryRun::start(Box::new(strategy), by_name()).await.err().unwrap();
        assert!(matches!(err, HubError::DiscoveryUnavailable { .. }));
        assert_eq!(err.status(), 503);
    }

    #[tokio::test]
    async fn cancel_releases_the_strategy() {
        let mut strategy = ScriptedStrategy::new(vec![announcement("bridge-a", None)]);
        strategy.linger = true;
        let released = Arc::clone(&strategy.released);

        let mut run = DiscoveryRun::start(Box::new(strategy), by_name()).await.unwrap();
        assert!(run.next().await.is_some());
        assert!(!released.load(Ordering::SeqCst));

        tokio::time::timeout(Duration::from_secs(1), run.cancel()).await.unwrap();
        assert!(released.load(Ordering::SeqCst));
    }
}

use std::collections::BTreeMap;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use hubkit_common::config::Config;
use hubkit_common::device::{DeviceData, DeviceRecord};
use hubkit_common::discovery::{DiscoveryDetails, DiscoveryKind, DiscoveryResult};
use hubkit_core::discovery::{DiscoveryEngine, Strategy};
use hubkit_core::hooks::{App, Driver, ListDevicesRequest};
use hubkit_core::instance::{AppInstance, DriverInstance};
use hubkit_core::lifecycle::LifecycleDispatcher;
use hubkit_core::pairing::PairingManager;
use tokio::sync::mpsc;

pub fn data(id: &str) -> DeviceData {
    DeviceData::from([("id".to_string(), id.to_string())])
}

pub fn record(name: &str, id: &str) -> DeviceRecord {
    DeviceRecord::new(name, data(id))
}

pub struct QuietApp;

impl App for QuietApp {}

/// A driver that lists a fixed set of records, or fails listing.
pub struct ListingDriver {
    records: Vec<DeviceRecord>,
    failure: Option<String>,
    pub listed: AtomicUsize,
}

impl ListingDriver {
    pub fn offering(records: Vec<DeviceRecord>) -> Self {
        Self {
            records,
            failure: None,
            listed: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            records: Vec::new(),
            failure: Some(message.to_string()),
            listed: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Driver for ListingDriver {
    async fn on_pair_list_devices(
        &self,
        _driver: &DriverInstance,
        _request: ListDevicesRequest,
    ) -> anyhow::Result<Vec<DeviceRecord>> {
        self.listed.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.failure {
            anyhow::bail!("{message}");
        }
        Ok(self.records.clone())
    }
}

/// An initialized app with a single driver `lights`.
pub async fn app_with(driver: Arc<dyn Driver>) -> (Arc<AppInstance>, Arc<DriverInstance>) {
    app_with_driver("lights", driver).await
}

pub async fn app_with_driver(driver_id: &str, driver: Arc<dyn Driver>) -> (Arc<AppInstance>, Arc<DriverInstance>) {
    ready_app(DriverInstance::new(driver_id, driver)).await
}

/// An initialized app around an already configured driver instance.
pub async fn ready_app(driver: DriverInstance) -> (Arc<AppInstance>, Arc<DriverInstance>) {
    let driver_id = driver.id().to_string();
    let app = AppInstance::new(format!("com.example.{driver_id}"), Arc::new(QuietApp))
        .with_driver(driver)
        .unwrap();
    let app = Arc::new(app);
    let report = LifecycleDispatcher::new().initialize_app(&app).await.unwrap();
    assert!(report.is_clean());
    let driver = Arc::clone(app.driver(&driver_id).unwrap());
    (app, driver)
}

pub fn manager() -> PairingManager {
    manager_with_timeout(Duration::from_secs(300))
}

pub fn manager_with_timeout(selection_timeout: Duration) -> PairingManager {
    let config = Config {
        selection_timeout,
        listing_grace: Duration::from_millis(10),
        ..Config::default()
    };
    PairingManager::new(Arc::new(DiscoveryEngine::new(config)))
}

pub fn announcement(name: &str, address: Option<&str>) -> DiscoveryResult {
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

/// Replays a fixed list of sightings, then ends the sweep.
pub struct Replay(pub Vec<DiscoveryResult>);

#[async_trait]
impl Strategy for Replay {
    fn kind(&self) -> DiscoveryKind {
        DiscoveryKind::MdnsSd
    }

    async fn bind(&mut self) -> io::Result<()> {
        Ok(())
    }

    async fn sweep(&mut self, sink: mpsc::Sender<DiscoveryResult>) {
        for sighting in self.0.drain(..) {
            if sink.send(sighting).await.is_err() {
                return;
            }
        }
    }
}

/// A strategy whose socket can never be opened.
pub struct Unbindable;

#[async_trait]
impl Strategy for Unbindable {
    fn kind(&self) -> DiscoveryKind {
        DiscoveryKind::Ssdp
    }

    async fn bind(&mut self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::AddrInUse, "port 1900 is taken"))
    }

    async fn sweep(&mut self, _sink: mpsc::Sender<DiscoveryResult>) {}
}

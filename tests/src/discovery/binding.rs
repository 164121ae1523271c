use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hubkit_common::device::DeviceRecord;
use hubkit_common::discovery::{DiscoveryKind, DiscoveryResult, IdTemplate};
use hubkit_core::binding::{BindingOutcome, DiscoveryBinder};
use hubkit_core::discovery::DiscoveryRun;
use hubkit_core::hooks::{Device, Driver};
use hubkit_core::instance::{DeviceInstance, DriverInstance};
use hubkit_core::lifecycle::LifecycleDispatcher;

use crate::support::{Replay, announcement, data, record};

type Calls = Arc<Mutex<Vec<String>>>;

struct Bridge {
    calls: Calls,
}

#[async_trait]
impl Device for Bridge {
    async fn on_discovery_available(&self, device: &DeviceInstance, result: &DiscoveryResult) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(format!("available:{}", device.name()));
        if let Some(address) = result.address {
            device.set_store_value("address", address.to_string()).await;
        }
        Ok(())
    }

    async fn on_discovery_address_changed(
        &self,
        device: &DeviceInstance,
        result: &DiscoveryResult,
        previous: Option<IpAddr>,
    ) -> anyhow::Result<()> {
        let previous = previous.map(|ip| ip.to_string()).unwrap_or_default();
        self.calls
            .lock()
            .unwrap()
            .push(format!("moved:{}:{previous}", device.name()));
        if let Some(address) = result.address {
            device.set_store_value("address", address.to_string()).await;
        }
        Ok(())
    }

    async fn on_discovery_last_seen_changed(&self, device: &DeviceInstance, _result: &DiscoveryResult) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(format!("seen:{}", device.name()));
        Ok(())
    }
}

struct Bridges {
    calls: Calls,
}

impl Driver for Bridges {
    fn on_map_device(&self, _record: &DeviceRecord) -> Arc<dyn Device> {
        Arc::new(Bridge {
            calls: Arc::clone(&self.calls),
        })
    }
}

#[tokio::test]
async fn paired_devices_follow_their_sightings() {
    let calls: Calls = Arc::default();
    let driver = Arc::new(DriverInstance::new("bridges", Arc::new(Bridges { calls: Arc::clone(&calls) })));
    driver
        .restore([record("Hall", "hall-bridge"), record("Attic", "attic-bridge")])
        .unwrap();
    assert!(LifecycleDispatcher::new().initialize_driver(&driver).await.is_clean());

    let run = DiscoveryRun::start(
        Box::new(Replay(vec![
            announcement("hall-bridge", Some("10.0.0.2")),
            announcement("stranger", Some("10.0.0.9")),
            announcement("hall-bridge", Some("10.0.0.2")),
            announcement("hall-bridge", Some("10.0.0.3")),
        ])),
        IdTemplate::default_for(DiscoveryKind::MdnsSd),
    )
    .await
    .unwrap();
    DiscoveryBinder::new(Arc::clone(&driver)).follow(run).await;

    assert_eq!(
        *calls.lock().unwrap(),
        vec!["available:Hall", "seen:Hall", "moved:Hall:10.0.0.2"]
    );
    let hall = driver.device(&data("hall-bridge")).unwrap();
    assert!(hall.is_available());
    assert_eq!(hall.store_value("address").await, Some("10.0.0.3".into()));

    let attic = driver.device(&data("attic-bridge")).unwrap();
    assert_eq!(attic.store_value("address").await, None);
}

#[tokio::test]
async fn uninitialized_devices_ignore_sightings() {
    let calls: Calls = Arc::default();
    let driver = Arc::new(DriverInstance::new("bridges", Arc::new(Bridges { calls: Arc::clone(&calls) })));
    driver.restore([record("Hall", "hall-bridge")]).unwrap();

    let mut binder = DiscoveryBinder::new(Arc::clone(&driver));
    let outcomes = binder.offer(&announcement_for("hall-bridge")).await;

    assert!(outcomes.is_empty());
    assert!(calls.lock().unwrap().is_empty());
}

fn announcement_for(id: &str) -> DiscoveryResult {
    let mut result = announcement(id, Some("10.0.0.2"));
    result.id = id.to_string();
    result
}

#[tokio::test]
async fn availability_is_reported_per_device() {
    let calls: Calls = Arc::default();
    let driver = Arc::new(DriverInstance::new("bridges", Arc::new(Bridges { calls })));
    driver.restore([record("Hall", "hall-bridge")]).unwrap();
    LifecycleDispatcher::new().initialize_driver(&driver).await;

    let mut binder = DiscoveryBinder::new(driver);
    let outcomes = binder.offer(&announcement_for("hall-bridge")).await;
    assert_eq!(outcomes, vec![BindingOutcome::Available { device: "Hall".into() }]);
}

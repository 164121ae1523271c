use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use hubkit_common::HubError;
use hubkit_common::config::Config;
use hubkit_common::device::DeviceRecord;
use hubkit_common::discovery::{MacConfig, StrategyConfig};
use hubkit_core::discovery::DiscoveryEngine;
use hubkit_core::hooks::{Driver, ListDevicesRequest};
use hubkit_core::instance::{DriverInstance, InitState};
use hubkit_core::network::neighbors::StaticNeighborTable;
use hubkit_core::network::tcp::Prober;
use hubkit_core::pairing::{PairingManager, PairingState, Selection};
use hubkit_core::vendors::NoVendors;
use pnet::util::MacAddr;
use serde_json::json;
use tokio::sync::mpsc;

use crate::support::{
    ListingDriver, app_with, app_with_driver, data, manager, manager_with_timeout, ready_app, record,
};

#[tokio::test]
async fn listing_offers_the_single_candidate() {
    let (_app, driver) = app_with(Arc::new(ListingDriver::offering(vec![record("Device 1", "dev-1")]))).await;
    let manager = manager();
    let mut session = manager.start_session(&driver).await.unwrap();

    let candidates = session.list_devices("list_devices", json!({})).await.unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].data.get("id").map(String::as_str), Some("dev-1"));
    assert_eq!(session.state(), PairingState::AwaitingSelection);
}

#[tokio::test]
async fn selecting_the_candidate_completes_pairing() {
    let (_app, driver) = app_with(Arc::new(ListingDriver::offering(vec![record("Device 1", "dev-1")]))).await;
    let manager = manager();
    let mut session = manager.start_session(&driver).await.unwrap();
    session.list_devices("list_devices", json!({})).await.unwrap();

    let device = session.select(Selection::Index(0)).await.unwrap();

    assert_eq!(session.state(), PairingState::Completed);
    assert_eq!(device.data().get("id").map(String::as_str), Some("dev-1"));
    assert_eq!(device.init_state(), InitState::Ready);
    assert_eq!(driver.devices().len(), 1);
    assert!(!manager.is_pairing("lights"));
}

#[tokio::test]
async fn listing_error_fails_without_creating_devices() {
    let (_app, driver) = app_with(Arc::new(ListingDriver::failing("bridge button not pressed"))).await;
    let manager = manager();
    let mut session = manager.start_session(&driver).await.unwrap();

    let err = session.list_devices("list_devices", json!({})).await.unwrap_err();

    assert!(matches!(err, HubError::PairingFailed { .. }));
    assert_eq!(session.state(), PairingState::Failed);
    assert!(session.reason().unwrap().contains("bridge button not pressed"));
    assert!(driver.devices().is_empty());
    assert!(!manager.is_pairing("lights"));
}

#[tokio::test]
async fn concurrent_sessions_on_one_driver_are_busy() {
    let (_app, driver) = app_with(Arc::new(ListingDriver::offering(vec![record("Device 1", "dev-1")]))).await;
    let manager = manager();

    let (first, second) = tokio::join!(manager.start_session(&driver), manager.start_session(&driver));
    let (held, busy) = match (first, second) {
        (Ok(session), Err(e)) | (Err(e), Ok(session)) => (session, e),
        other => panic!("expected exactly one session, got {other:?}"),
    };
    assert!(matches!(busy, HubError::SessionBusy { .. }));
    assert!(manager.is_pairing("lights"));

    drop(held);
    assert!(manager.start_session(&driver).await.is_ok());
}

#[tokio::test]
async fn sessions_on_different_drivers_do_not_block() {
    let (_app, lights) = app_with(Arc::new(ListingDriver::offering(Vec::new()))).await;
    let (_other, plugs) = app_with_driver("plugs", Arc::new(ListingDriver::offering(Vec::new()))).await;
    let manager = manager();

    let _a = manager.start_session(&lights).await.unwrap();
    let _b = manager.start_session(&plugs).await.unwrap();
    assert!(manager.is_pairing("lights") && manager.is_pairing("plugs"));
}

#[tokio::test]
async fn await_selection_skips_bad_picks() {
    let listing = Arc::new(ListingDriver::offering(vec![
        record("Device 1", "dev-1"),
        record("Device 2", "dev-2"),
    ]));
    let (_app, driver) = app_with(listing.clone()).await;
    let manager = manager();
    let mut session = manager.start_session(&driver).await.unwrap();
    session.list_devices("list_devices", json!({})).await.unwrap();

    let (tx, mut rx) = mpsc::channel(4);
    tx.send(Selection::Index(9)).await.unwrap();
    tx.send(Selection::Data(data("dev-2"))).await.unwrap();

    let device = session.await_selection(&mut rx).await.unwrap();
    assert_eq!(device.name(), "Device 2");
    assert_eq!(listing.listed.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn unanswered_selection_cancels_the_session() {
    let (_app, driver) = app_with(Arc::new(ListingDriver::offering(vec![record("Device 1", "dev-1")]))).await;
    let manager = manager_with_timeout(Duration::from_secs(60));
    let mut session = manager.start_session(&driver).await.unwrap();
    session.list_devices("list_devices", json!({})).await.unwrap();

    let (_tx, mut rx) = mpsc::channel::<Selection>(1);
    let err = session.await_selection(&mut rx).await.unwrap_err();

    assert!(matches!(err, HubError::SessionCancelled { .. }));
    assert_eq!(session.state(), PairingState::Cancelled);
    assert!(driver.devices().is_empty());
    assert!(!manager.is_pairing("lights"));
}

#[tokio::test]
async fn pairing_the_same_data_twice_fails() {
    let (_app, driver) = app_with(Arc::new(ListingDriver::offering(vec![record("Device 1", "dev-1")]))).await;
    let manager = manager();

    let mut first = manager.start_session(&driver).await.unwrap();
    first.list_devices("list_devices", json!({})).await.unwrap();
    first.select(Selection::Index(0)).await.unwrap();

    let mut second = manager.start_session(&driver).await.unwrap();
    second.list_devices("list_devices", json!({})).await.unwrap();
    let err = second.select(Selection::Index(0)).await.unwrap_err();

    assert!(matches!(err, HubError::PairingFailed { .. }));
    assert_eq!(second.state(), PairingState::Failed);
    assert_eq!(driver.devices().len(), 1);
}

struct UpHosts(HashSet<IpAddr>);

#[async_trait]
impl Prober for UpHosts {
    async fn probe(&self, addr: IpAddr, _ports: &[u16], _limit: Duration) -> bool {
        self.0.contains(&addr)
    }
}

/// Offers one candidate per discovery result, keyed by the result id.
struct BridgeDriver;

#[async_trait]
impl Driver for BridgeDriver {
    async fn on_pair_list_devices(
        &self,
        _driver: &DriverInstance,
        request: ListDevicesRequest,
    ) -> anyhow::Result<Vec<DeviceRecord>> {
        Ok(request
            .discovered
            .iter()
            .map(|result| record(&format!("Bridge {}", result.id), &result.id))
            .collect())
    }
}

#[tokio::test]
async fn mac_discovery_feeds_pairing_candidates() {
    let config: MacConfig = serde_json::from_value(json!({
        "manufacturer": ["00:17:88"],
        "targets": ["10.1.0.0/29"],
    }))
    .unwrap();
    let driver = DriverInstance::new("bridges", Arc::new(BridgeDriver)).with_strategy(StrategyConfig::mac(config));
    let (_app, driver) = ready_app(driver).await;

    let bridge: IpAddr = "10.1.0.3".parse().unwrap();
    let engine = DiscoveryEngine::new(Config {
        listing_grace: Duration::from_secs(2),
        ..Config::default()
    })
    .with_prober(Arc::new(UpHosts(HashSet::from([bridge]))))
    .with_neighbors(Arc::new(StaticNeighborTable(HashMap::from([(
        bridge,
        MacAddr::new(0x00, 0x17, 0x88, 0x01, 0x02, 0x03),
    )]))))
    .with_vendors(Arc::new(NoVendors));
    let manager = PairingManager::new(Arc::new(engine));

    let mut session = manager.start_session(&driver).await.unwrap();
    assert!(manager.is_pairing("bridges"));
    session.list_devices("list_devices", json!({})).await.unwrap();

    assert_eq!(session.discovered().len(), 1);
    assert_eq!(session.discovered()[0].address, Some(bridge));
    let candidates = session.candidates();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].data.get("id").map(String::as_str), Some("00:17:88:01:02:03"));

    session.cancel().unwrap();
    assert_eq!(session.state(), PairingState::Cancelled);
    assert!(!manager.is_pairing("bridges"));
}

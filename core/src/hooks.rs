//! # Integration hooks
//!
//! The behaviour an integration app plugs into the runtime. Every hook has a
//! no-op default so an app only overrides what it needs.
//!
//! Hooks receive the runtime instance they belong to, which is how a device
//! reaches its own `data` and `store`.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use hubkit_common::device::DeviceRecord;
use hubkit_common::discovery::DiscoveryResult;
use serde_json::Value;

use crate::instance::{DeviceInstance, DriverInstance};

/// Input of [`Driver::on_pair_list_devices`].
#[derive(Debug, Clone)]
pub struct ListDevicesRequest {
    /// Pairing view that asked for the list, e.g. `list_devices`.
    pub view: String,
    pub params: Value,
    /// Discovery results seen by the session so far, in first-seen order.
    pub discovered: Vec<Arc<DiscoveryResult>>,
}

#[async_trait]
pub trait App: Send + Sync + 'static {
    async fn on_init(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
pub trait Driver: Send + Sync + 'static {
    async fn on_init(&self, _driver: &DriverInstance) -> anyhow::Result<()> {
        Ok(())
    }

    /// Enumerates pairing candidates. An error fails the pairing session.
    async fn on_pair_list_devices(
        &self,
        _driver: &DriverInstance,
        _request: ListDevicesRequest,
    ) -> anyhow::Result<Vec<DeviceRecord>> {
        Ok(Vec::new())
    }

    /// Picks the device behaviour for a record.
    fn on_map_device(&self, _record: &DeviceRecord) -> Arc<dyn Device> {
        Arc::new(PlainDevice)
    }
}

#[async_trait]
pub trait Device: Send + Sync + 'static {
    async fn on_init(&self, _device: &DeviceInstance) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs once after a device paired and initialized.
    async fn on_added(&self, _device: &DeviceInstance) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_deleted(&self, _device: &DeviceInstance) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_uninit(&self, _device: &DeviceInstance) -> anyhow::Result<()> {
        Ok(())
    }

    /// Whether a sighting belongs to this device. Matches `data.id` by default.
    fn on_discovery_result(&self, device: &DeviceInstance, result: &DiscoveryResult) -> bool {
        device.data().get("id").is_some_and(|id| *id == result.id)
    }

    /// First matching sighting. An error marks the device unavailable.
    async fn on_discovery_available(
        &self,
        _device: &DeviceInstance,
        _result: &DiscoveryResult,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_discovery_address_changed(
        &self,
        _device: &DeviceInstance,
        _result: &DiscoveryResult,
        _previous: Option<IpAddr>,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_discovery_last_seen_changed(
        &self,
        _device: &DeviceInstance,
        _result: &DiscoveryResult,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Device behaviour of drivers that do not map records.
pub struct PlainDevice;

impl Device for PlainDevice {}

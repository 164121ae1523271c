use async_trait::async_trait;
use hubkit_common::discovery::DiscoveryResult;
use hubkit_core::hooks::Device;
use hubkit_core::instance::DeviceInstance;
use std::net::IpAddr;
use tracing::info;

pub struct MyDevice;

#[async_trait]
impl Device for MyDevice {
    async fn on_init(&self, device: &DeviceInstance) -> anyhow::Result<()> {
        info!(target: "hubkit::device", device = %device.name(), "Initialized MyDevice");
        Ok(())
    }

    async fn on_added(&self, device: &DeviceInstance) -> anyhow::Result<()> {
        info!(target: "hubkit::device", device = %device.name(), "MyDevice has been added");
        Ok(())
    }

    async fn on_deleted(&self, device: &DeviceInstance) -> anyhow::Result<()> {
        info!(target: "hubkit::device", device = %device.name(), "MyDevice has been deleted");
        Ok(())
    }

    async fn on_discovery_available(&self, device: &DeviceInstance, result: &DiscoveryResult) -> anyhow::Result<()> {
        remember_address(device, result).await;
        Ok(())
    }

    async fn on_discovery_address_changed(
        &self,
        device: &DeviceInstance,
        result: &DiscoveryResult,
        _previous: Option<IpAddr>,
    ) -> anyhow::Result<()> {
        remember_address(device, result).await;
        Ok(())
    }
}

async fn remember_address(device: &DeviceInstance, result: &DiscoveryResult) {
    if let Some(address) = result.address {
        device.set_store_value("address", address.to_string()).await;
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use hubkit_common::device::{DeviceData, DeviceRecord};
use hubkit_core::hooks::{Device, Driver, ListDevicesRequest};
use hubkit_core::instance::DriverInstance;
use tracing::info;

use crate::device::MyDevice;

pub struct MyDriver;

#[async_trait]
impl Driver for MyDriver {
    async fn on_init(&self, driver: &DriverInstance) -> anyhow::Result<()> {
        info!(target: "hubkit::driver", driver = %driver.id(), "Initialized MyDriver");
        Ok(())
    }

    /// Offers every discovered device, or the local placeholder when nothing was found.
    async fn on_pair_list_devices(
        &self,
        _driver: &DriverInstance,
        request: ListDevicesRequest,
    ) -> anyhow::Result<Vec<DeviceRecord>> {
        if request.discovered.is_empty() {
            return Ok(vec![placeholder()]);
        }

        Ok(request
            .discovered
            .iter()
            .map(|result| {
                let data = DeviceData::from([("id".to_string(), result.id.clone())]);
                let record = DeviceRecord::new(result.id.clone(), data);
                match result.address {
                    Some(address) => record.with_store_value("address", address.to_string()),
                    None => record,
                }
            })
            .collect())
    }

    fn on_map_device(&self, _record: &DeviceRecord) -> Arc<dyn Device> {
        Arc::new(MyDevice)
    }
}

fn placeholder() -> DeviceRecord {
    DeviceRecord::new(
        "My Device",
        DeviceData::from([("id".to_string(), "my-device".to_string())]),
    )
    .with_store_value("address", "127.0.0.1")
}

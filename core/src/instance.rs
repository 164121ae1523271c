//! # Instance graph
//!
//! Runtime instances of the App → Driver → Device containment hierarchy.
//! The graph is owned top-down: an [`AppInstance`] owns its drivers, a
//! [`DriverInstance`] owns its devices. Instances never point back up.
//!
//! Each instance carries a [`HookGate`], an async mutex every hook of that
//! instance runs under, plus the instance's [`InitState`].

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use hubkit_common::HubError;
use hubkit_common::config::{AppManifest, DriverManifest};
use hubkit_common::device::{DeviceData, DeviceRecord, DeviceStore};
use hubkit_common::discovery::StrategyConfig;
use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::hooks::{App, Device, Driver};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitState {
    Uninitialized,
    Ready,
    FailedInit(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available,
    Unavailable(String),
}

/// Serializes the hooks of one instance and records its init outcome.
pub(crate) struct HookGate {
    gate: Mutex<()>,
    init: RwLock<InitState>,
}

impl HookGate {
    fn new() -> Self {
        Self {
            gate: Mutex::new(()),
            init: RwLock::new(InitState::Uninitialized),
        }
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().await
    }

    pub(crate) fn init_state(&self) -> InitState {
        self.init.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn set_init_state(&self, state: InitState) {
        *self.init.write().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

pub struct DeviceInstance {
    driver_id: String,
    name: String,
    data: DeviceData,
    store: Mutex<DeviceStore>,
    availability: RwLock<Availability>,
    hooks: Arc<dyn Device>,
    gate: HookGate,
}

impl DeviceInstance {
    pub fn new(driver_id: impl Into<String>, record: DeviceRecord, hooks: Arc<dyn Device>) -> Self {
        Self {
            driver_id: driver_id.into(),
            name: record.name,
            data: record.data,
            store: Mutex::new(record.store),
            availability: RwLock::new(Availability::Available),
            hooks,
            gate: HookGate::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Immutable identifiers. Unique among the devices of a driver.
    pub fn data(&self) -> &DeviceData {
        &self.data
    }

    pub fn driver_id(&self) -> &str {
        &self.driver_id
    }

    pub fn init_state(&self) -> InitState {
        self.gate.init_state()
    }

    pub async fn store_value(&self, key: &str) -> Option<Value> {
        self.store.lock().await.get(key).cloned()
    }

    pub async fn set_store_value(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.store.lock().await.insert(key.into(), value.into());
    }

    pub async fn unset_store_value(&self, key: &str) -> Option<Value> {
        self.store.lock().await.remove(key)
    }

    /// Applies several store changes under one lock acquisition.
    pub async fn update_store<R>(&self, update: impl FnOnce(&mut DeviceStore) -> R) -> R {
        let mut store = self.store.lock().await;
        update(&mut store)
    }

    pub async fn to_record(&self) -> DeviceRecord {
        DeviceRecord {
            name: self.name.clone(),
            data: self.data.clone(),
            store: self.store.lock().await.clone(),
        }
    }

    pub fn availability(&self) -> Availability {
        self.availability
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_available(&self) -> bool {
        self.availability() == Availability::Available
    }

    pub fn set_available(&self) {
        self.set_availability(Availability::Available);
    }

    pub fn set_unavailable(&self, message: impl Into<String>) {
        self.set_availability(Availability::Unavailable(message.into()));
    }

    fn set_availability(&self, availability: Availability) {
        *self
            .availability
            .write()
            .unwrap_or_else(PoisonError::into_inner) = availability;
    }

    pub(crate) fn hooks(&self) -> &Arc<dyn Device> {
        &self.hooks
    }

    pub(crate) fn gate(&self) -> &HookGate {
        &self.gate
    }

    /// Runs the removal hooks. Errors are logged, removal always proceeds.
    async fn retire(&self, deleted: bool) {
        let _guard = self.gate.lock().await;
        if deleted && let Err(e) = self.hooks.on_deleted(self).await {
            warn!(target: "hubkit::device", device = %self.name, "on_deleted failed: {e:#}");
        }
        if let Err(e) = self.hooks.on_uninit(self).await {
            warn!(target: "hubkit::device", device = %self.name, "on_uninit failed: {e:#}");
        }
        self.gate.set_init_state(InitState::Uninitialized);
    }
}

impl fmt::Debug for DeviceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceInstance")
            .field("driver_id", &self.driver_id)
            .field("name", &self.name)
            .field("data", &self.data)
            .field("init", &self.init_state())
            .finish_non_exhaustive()
    }
}

pub struct DriverInstance {
    id: String,
    name: String,
    strategy: Option<StrategyConfig>,
    hooks: Arc<dyn Driver>,
    devices: RwLock<Vec<Arc<DeviceInstance>>>,
    gate: HookGate,
}

impl DriverInstance {
    pub fn new(id: impl Into<String>, hooks: Arc<dyn Driver>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            strategy: None,
            hooks,
            devices: RwLock::new(Vec::new()),
            gate: HookGate::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Discovery strategy that pairing sessions of this driver run.
    pub fn with_strategy(mut self, strategy: StrategyConfig) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn strategy(&self) -> Option<&StrategyConfig> {
        self.strategy.as_ref()
    }

    pub fn init_state(&self) -> InitState {
        self.gate.init_state()
    }

    pub fn devices(&self) -> Vec<Arc<DeviceInstance>> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn device(&self, data: &DeviceData) -> Option<Arc<DeviceInstance>> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|device| device.data() == data)
            .cloned()
    }

    /// Builds an uninitialized device for `record` through the driver's mapping hook.
    pub fn map_device(&self, record: DeviceRecord) -> Result<DeviceInstance, HubError> {
        record.validate()?;
        let hooks = self.hooks.on_map_device(&record);
        Ok(DeviceInstance::new(self.id.clone(), record, hooks))
    }

    /// Re-creates previously paired devices from their persisted records.
    ///
    /// Call before initialization; the lifecycle dispatcher initializes them
    /// once the driver is ready.
    pub fn restore(&self, records: impl IntoIterator<Item = DeviceRecord>) -> Result<(), HubError> {
        for record in records {
            let device = self.map_device(record)?;
            self.attach(Arc::new(device))?;
        }
        Ok(())
    }

    /// Adds a device, refusing a second device with the same `data`.
    pub(crate) fn attach(&self, device: Arc<DeviceInstance>) -> Result<(), HubError> {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        if devices.iter().any(|existing| existing.data() == device.data()) {
            return Err(HubError::pairing_failed(format!(
                "driver '{}' already has a device with data {:?}",
                self.id,
                device.data()
            )));
        }
        debug!(target: "hubkit::driver", driver = %self.id, device = %device.name(), "device attached");
        devices.push(device);
        Ok(())
    }

    /// Detaches a device and runs its `on_deleted` and `on_uninit` hooks.
    pub async fn remove_device(&self, data: &DeviceData) -> Option<Arc<DeviceInstance>> {
        let removed = {
            let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
            let index = devices.iter().position(|device| device.data() == data)?;
            devices.remove(index)
        };
        removed.retire(true).await;
        Some(removed)
    }

    /// Runs `on_uninit` on every device, keeping them attached.
    pub async fn uninit_devices(&self) {
        for device in self.devices() {
            if device.init_state() == InitState::Ready {
                device.retire(false).await;
            }
        }
    }

    pub(crate) fn hooks(&self) -> &Arc<dyn Driver> {
        &self.hooks
    }

    pub(crate) fn gate(&self) -> &HookGate {
        &self.gate
    }
}

impl fmt::Debug for DriverInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverInstance")
            .field("id", &self.id)
            .field("init", &self.init_state())
            .field("devices", &self.devices().len())
            .finish_non_exhaustive()
    }
}

pub struct AppInstance {
    id: String,
    hooks: Arc<dyn App>,
    drivers: Vec<Arc<DriverInstance>>,
    gate: HookGate,
}

impl AppInstance {
    pub fn new(id: impl Into<String>, hooks: Arc<dyn App>) -> Self {
        Self {
            id: id.into(),
            hooks,
            drivers: Vec::new(),
            gate: HookGate::new(),
        }
    }

    pub fn with_driver(mut self, driver: DriverInstance) -> Result<Self, HubError> {
        if self.driver(driver.id()).is_some() {
            return Err(HubError::invalid_config(format!(
                "duplicate driver id '{}'",
                driver.id()
            )));
        }
        self.drivers.push(Arc::new(driver));
        Ok(self)
    }

    /// Builds the graph declared by a manifest.
    ///
    /// `driver_hooks` supplies the behaviour for each declared driver. A
    /// driver it has no behaviour for is a configuration error.
    pub fn from_manifest<F>(
        manifest: &AppManifest,
        hooks: Arc<dyn App>,
        mut driver_hooks: F,
    ) -> Result<Self, HubError>
    where
        F: FnMut(&DriverManifest) -> Option<Arc<dyn Driver>>,
    {
        let mut app = Self::new(manifest.id.clone(), hooks);
        for declared in &manifest.drivers {
            let behaviour = driver_hooks(declared).ok_or_else(|| {
                HubError::invalid_config(format!("no implementation for driver '{}'", declared.id))
            })?;
            let mut driver = DriverInstance::new(declared.id.clone(), behaviour);
            if let Some(name) = &declared.name {
                driver = driver.with_name(name.clone());
            }
            if let Some(strategy) = manifest.strategy_for(&declared.id) {
                driver = driver.with_strategy(strategy.clone());
            }
            app = app.with_driver(driver)?;
        }
        Ok(app)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn init_state(&self) -> InitState {
        self.gate.init_state()
    }

    pub fn driver(&self, id: &str) -> Option<&Arc<DriverInstance>> {
        self.drivers.iter().find(|driver| driver.id() == id)
    }

    pub fn drivers(&self) -> &[Arc<DriverInstance>] {
        &self.drivers
    }

    pub(crate) fn hooks(&self) -> &Arc<dyn App> {
        &self.hooks
    }

    pub(crate) fn gate(&self) -> &HookGate {
        &self.gate
    }
}

impl fmt::Debug for AppInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppInstance")
            .field("id", &self.id)
            .field("init", &self.init_state())
            .field("drivers", &self.drivers)
            .finish_non_exhaustive()
    }
}

//! # Lifecycle Dispatcher
//!
//! Runs `on_init` hooks across the instance graph.
//!
//! Ordering:
//! - the app is ready before any driver starts initializing
//! - a driver is ready before any of its devices starts initializing
//! - drivers initialize concurrently, and so do the devices of one driver
//!
//! Every hook runs in its own task so a panicking hook is reported as a
//! failure of that instance instead of unwinding through the dispatcher.
//!
//! Each hook runs at most once per instance. Concurrent callers wait on the
//! instance's hook gate and observe the outcome of the first call. A failed
//! instance is [`InitState::FailedInit`] and its dependents are skipped.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use hubkit_common::HubError;
use tracing::{debug, info, warn};

use crate::instance::{AppInstance, DeviceInstance, DriverInstance, HookGate, InitState};

/// An instance whose init hook the dispatcher can run.
#[async_trait]
pub trait Initialize: Send + Sync {
    fn tier(&self) -> &'static str;

    fn instance_id(&self) -> String;

    fn init_state(&self) -> InitState;

    /// Runs the init hook unless it already ran.
    async fn run_init(&self) -> Result<(), HubError>;
}

#[async_trait]
impl Initialize for AppInstance {
    fn tier(&self) -> &'static str {
        "app"
    }

    fn instance_id(&self) -> String {
        self.id().to_string()
    }

    fn init_state(&self) -> InitState {
        AppInstance::init_state(self)
    }

    async fn run_init(&self) -> Result<(), HubError> {
        run_once(self.gate(), self.tier(), self.id(), self.hooks().on_init()).await
    }
}

#[async_trait]
impl Initialize for DriverInstance {
    fn tier(&self) -> &'static str {
        "driver"
    }

    fn instance_id(&self) -> String {
        self.id().to_string()
    }

    fn init_state(&self) -> InitState {
        DriverInstance::init_state(self)
    }

    async fn run_init(&self) -> Result<(), HubError> {
        run_once(self.gate(), self.tier(), self.id(), self.hooks().on_init(self)).await
    }
}

#[async_trait]
impl Initialize for DeviceInstance {
    fn tier(&self) -> &'static str {
        "device"
    }

    fn instance_id(&self) -> String {
        format!("{}/{}", self.driver_id(), self.name())
    }

    fn init_state(&self) -> InitState {
        DeviceInstance::init_state(self)
    }

    async fn run_init(&self) -> Result<(), HubError> {
        let id = self.instance_id();
        run_once(self.gate(), self.tier(), &id, self.hooks().on_init(self)).await
    }
}

/// Instances whose hook gate the dispatcher can mark after a panic.
pub(crate) trait Gated {
    fn hook_gate(&self) -> &HookGate;
}

impl Gated for AppInstance {
    fn hook_gate(&self) -> &HookGate {
        self.gate()
    }
}

impl Gated for DriverInstance {
    fn hook_gate(&self) -> &HookGate {
        self.gate()
    }
}

impl Gated for DeviceInstance {
    fn hook_gate(&self) -> &HookGate {
        self.gate()
    }
}

async fn run_once<F>(gate: &HookGate, tier: &'static str, id: &str, hook: F) -> Result<(), HubError>
where
    F: Future<Output = anyhow::Result<()>>,
{
    let _guard = gate.lock().await;
    match gate.init_state() {
        InitState::Ready => return Ok(()),
        InitState::FailedInit(reason) => return Err(HubError::init_failed(tier, id, reason)),
        InitState::Uninitialized => {}
    }

    match hook.await {
        Ok(()) => {
            gate.set_init_state(InitState::Ready);
            debug!(target: "hubkit::lifecycle", tier, id, "initialized");
            Ok(())
        }
        Err(e) => {
            let reason = format!("{e:#}");
            warn!(target: "hubkit::lifecycle", tier, id, "init failed: {reason}");
            gate.set_init_state(InitState::FailedInit(reason.clone()));
            Err(HubError::init_failed(tier, id, reason))
        }
    }
}

/// Outcome of initializing a subtree.
#[derive(Debug, Default)]
pub struct InitReport {
    pub drivers_ready: usize,
    pub devices_ready: usize,
    /// Failed drivers and devices. Their siblings are unaffected.
    pub failures: Vec<HubError>,
}

impl InitReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn merge(&mut self, other: InitReport) {
        self.drivers_ready += other.drivers_ready;
        self.devices_ready += other.devices_ready;
        self.failures.extend(other.failures);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LifecycleDispatcher;

impl LifecycleDispatcher {
    pub fn new() -> Self {
        Self
    }

    /// Runs one instance's init hook exactly once.
    pub async fn initialize<T: Initialize + ?Sized>(&self, instance: &T) -> Result<(), HubError> {
        instance.run_init().await
    }

    /// Runs the init hook in its own task, so a panicking hook fails only
    /// this instance and is remembered as [`InitState::FailedInit`].
    pub(crate) async fn initialize_isolated<T>(&self, instance: &Arc<T>) -> Result<(), HubError>
    where
        T: Initialize + Gated + 'static,
    {
        let task = Arc::clone(instance);
        match tokio::spawn(async move { task.run_init().await }).await {
            Ok(outcome) => outcome,
            Err(_) => Err(panicked(instance.hook_gate(), instance.tier(), &instance.instance_id())),
        }
    }

    /// Initializes the whole graph.
    ///
    /// An app failure is returned as the error and nothing below it runs.
    /// Driver and device failures are collected in the report.
    pub async fn initialize_app(&self, app: &Arc<AppInstance>) -> Result<InitReport, HubError> {
        self.initialize_isolated(app).await?;
        info!(target: "hubkit::lifecycle", app = %app.id(), "app ready, initializing {} drivers", app.drivers().len());

        let mut report = InitReport::default();
        let tasks: Vec<_> = app
            .drivers()
            .iter()
            .map(|driver| {
                let task = Arc::clone(driver);
                let handle = tokio::spawn(async move { LifecycleDispatcher.initialize_driver(&task).await });
                (Arc::clone(driver), handle)
            })
            .collect();

        for (driver, handle) in tasks {
            match handle.await {
                Ok(driver_report) => report.merge(driver_report),
                Err(_) => report.failures.push(panicked(driver.gate(), "driver", driver.id())),
            }
        }
        Ok(report)
    }

    /// Initializes a driver, then all of its devices concurrently.
    pub async fn initialize_driver(&self, driver: &DriverInstance) -> InitReport {
        let mut report = InitReport::default();
        if let Err(e) = self.initialize(driver).await {
            report.failures.push(e);
            return report;
        }
        report.drivers_ready += 1;

        let tasks: Vec<_> = driver
            .devices()
            .into_iter()
            .map(|device| {
                let task = Arc::clone(&device);
                let handle = tokio::spawn(async move { task.run_init().await });
                (device, handle)
            })
            .collect();

        for (device, handle) in tasks {
            match handle.await {
                Ok(Ok(())) => report.devices_ready += 1,
                Ok(Err(e)) => report.failures.push(e),
                Err(_) => {
                    let id = device.instance_id();
                    report.failures.push(panicked(device.gate(), "device", &id));
                }
            }
        }
        report
    }

    /// Runs `on_uninit` on every initialized device of the app.
    pub async fn teardown(&self, app: &AppInstance) {
        for driver in app.drivers() {
            driver.uninit_devices().await;
        }
    }
}

fn panicked(gate: &HookGate, tier: &'static str, id: &str) -> HubError {
    let reason = "init hook panicked".to_string();
    warn!(target: "hubkit::lifecycle", tier, id, "{reason}");
    gate.set_init_state(InitState::FailedInit(reason.clone()));
    HubError::init_failed(tier, id, reason)
}

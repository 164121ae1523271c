use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hubkit_common::HubError;
use hubkit_common::device::DeviceRecord;
use hubkit_core::hooks::{App, Device, Driver};
use hubkit_core::instance::{AppInstance, DeviceInstance, DriverInstance, InitState};
use hubkit_core::lifecycle::LifecycleDispatcher;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::support::record;

type Trace = Arc<Mutex<Vec<String>>>;

struct TracedApp {
    trace: Trace,
    calls: AtomicUsize,
}

#[async_trait]
impl App for TracedApp {
    async fn on_init(&self) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(3)).await;
        self.trace.lock().unwrap().push("app".to_string());
        Ok(())
    }
}

struct TracedDriver {
    trace: Trace,
    delay: Duration,
    fails: bool,
}

#[async_trait]
impl Driver for TracedDriver {
    async fn on_init(&self, driver: &DriverInstance) -> anyhow::Result<()> {
        tokio::time::sleep(self.delay).await;
        if self.fails {
            anyhow::bail!("driver {} refused to start", driver.id());
        }
        self.trace.lock().unwrap().push(format!("driver:{}", driver.id()));
        Ok(())
    }

    fn on_map_device(&self, record: &DeviceRecord) -> Arc<dyn Device> {
        let delay = record.store.get("delay_ms").and_then(|v| v.as_u64()).unwrap_or(0);
        Arc::new(TracedDevice {
            trace: Arc::clone(&self.trace),
            delay: Duration::from_millis(delay),
        })
    }
}

struct TracedDevice {
    trace: Trace,
    delay: Duration,
}

#[async_trait]
impl Device for TracedDevice {
    async fn on_init(&self, device: &DeviceInstance) -> anyhow::Result<()> {
        let key = format!("{}/{}", device.driver_id(), device.name());
        self.trace.lock().unwrap().push(format!("start:device:{key}"));
        tokio::time::sleep(self.delay).await;
        self.trace.lock().unwrap().push(format!("device:{key}"));
        Ok(())
    }
}

struct Shape {
    /// Device count per driver, and whether the driver fails.
    drivers: Vec<(usize, bool)>,
}

fn build(shape: &Shape, rng: &mut StdRng, trace: &Trace) -> Arc<AppInstance> {
    let mut app = AppInstance::new(
        "com.example.shape",
        Arc::new(TracedApp {
            trace: Arc::clone(trace),
            calls: AtomicUsize::new(0),
        }),
    );
    for (d, (devices, fails)) in shape.drivers.iter().enumerate() {
        let hooks = TracedDriver {
            trace: Arc::clone(trace),
            delay: Duration::from_millis(rng.random_range(0..20)),
            fails: *fails,
        };
        let driver = DriverInstance::new(format!("d{d}"), Arc::new(hooks));
        driver
            .restore((0..*devices).map(|n| {
                record(&format!("n{n}"), &format!("d{d}-n{n}")).with_store_value("delay_ms", rng.random_range(0..20u64))
            }))
            .unwrap();
        app = app.with_driver(driver).unwrap();
    }
    Arc::new(app)
}

#[tokio::test(start_paused = true)]
async fn parents_always_initialize_before_children() {
    for seed in 0..128u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let shape = Shape {
            drivers: (0..rng.random_range(0..5))
                .map(|_| (rng.random_range(0..6), rng.random_bool(0.2)))
                .collect(),
        };
        let trace: Trace = Arc::default();
        let app = build(&shape, &mut rng, &trace);

        let report = LifecycleDispatcher::new().initialize_app(&app).await.unwrap();
        let trace = trace.lock().unwrap().clone();
        let position: HashMap<&str, usize> = trace.iter().enumerate().map(|(i, e)| (e.as_str(), i)).collect();

        assert_eq!(trace.first().map(String::as_str), Some("app"), "seed {seed}");
        assert_eq!(position.len(), trace.len(), "seed {seed}: a hook ran twice");

        let mut expected_devices = 0;
        for (d, (devices, fails)) in shape.drivers.iter().enumerate() {
            let driver_key = format!("driver:d{d}");
            let driver = app.driver(&format!("d{d}")).unwrap();
            if *fails {
                assert!(!position.contains_key(driver_key.as_str()), "seed {seed}");
                assert!(matches!(driver.init_state(), InitState::FailedInit(_)), "seed {seed}");
                for n in 0..*devices {
                    assert!(!position.contains_key(format!("start:device:d{d}/n{n}").as_str()), "seed {seed}");
                    assert!(!position.contains_key(format!("device:d{d}/n{n}").as_str()), "seed {seed}");
                }
                continue;
            }
            expected_devices += devices;
            let driver_at = position[driver_key.as_str()];
            for n in 0..*devices {
                let start_at = position[format!("start:device:d{d}/n{n}").as_str()];
                let device_at = position[format!("device:d{d}/n{n}").as_str()];
                assert!(driver_at < start_at, "seed {seed}: d{d}/n{n} started before its driver finished");
                assert!(start_at < device_at, "seed {seed}");
            }
        }

        let failing = shape.drivers.iter().filter(|(_, fails)| *fails).count();
        assert_eq!(report.failures.len(), failing, "seed {seed}");
        assert_eq!(report.drivers_ready, shape.drivers.len() - failing, "seed {seed}");
        assert_eq!(report.devices_ready, expected_devices, "seed {seed}");
    }
}

#[tokio::test]
async fn initializing_twice_runs_the_hook_once() {
    let trace: Trace = Arc::default();
    let hooks = Arc::new(TracedApp {
        trace: Arc::clone(&trace),
        calls: AtomicUsize::new(0),
    });
    let app = AppInstance::new("com.example.twice", hooks.clone());
    let dispatcher = LifecycleDispatcher::new();

    let (a, b) = tokio::join!(dispatcher.initialize(&app), dispatcher.initialize(&app));
    a.unwrap();
    b.unwrap();
    dispatcher.initialize(&app).await.unwrap();

    assert_eq!(hooks.calls.load(Ordering::SeqCst), 1);
    assert_eq!(*trace.lock().unwrap(), vec!["app".to_string()]);
    assert_eq!(app.init_state(), InitState::Ready);
}

#[tokio::test]
async fn restored_devices_come_up_with_their_driver() {
    let trace: Trace = Arc::default();
    let shape = Shape {
        drivers: vec![(3, false)],
    };
    let app = build(&shape, &mut StdRng::seed_from_u64(7), &trace);

    let report = LifecycleDispatcher::new().initialize_app(&app).await.unwrap();

    assert!(report.is_clean());
    let driver = app.driver("d0").unwrap();
    assert!(driver.devices().iter().all(|device| device.init_state() == InitState::Ready));
}

struct RefusingApp;

#[async_trait]
impl App for RefusingApp {
    async fn on_init(&self) -> anyhow::Result<()> {
        anyhow::bail!("hub storage is read-only")
    }
}

#[tokio::test]
async fn failed_app_leaves_every_driver_uninitialized() {
    let trace: Trace = Arc::default();
    let mut app = AppInstance::new("com.example.refusing", Arc::new(RefusingApp));
    for d in 0..3 {
        let hooks = TracedDriver {
            trace: Arc::clone(&trace),
            delay: Duration::ZERO,
            fails: false,
        };
        let driver = DriverInstance::new(format!("d{d}"), Arc::new(hooks));
        driver.restore([record("n0", &format!("d{d}-n0"))]).unwrap();
        app = app.with_driver(driver).unwrap();
    }
    let app = Arc::new(app);

    let err = LifecycleDispatcher::new().initialize_app(&app).await.unwrap_err();

    assert!(matches!(err, HubError::InitFailed { tier: "app", .. }));
    assert!(matches!(app.init_state(), InitState::FailedInit(_)));
    for d in 0..3 {
        let driver = app.driver(&format!("d{d}")).unwrap();
        assert_eq!(driver.init_state(), InitState::Uninitialized);
        assert_eq!(driver.devices()[0].init_state(), InitState::Uninitialized);
    }
    assert!(trace.lock().unwrap().is_empty());
}

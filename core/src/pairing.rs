//! # Pairing Sessions
//!
//! A session walks one driver through
//! `Created → Listing → AwaitingSelection → Provisioning → Completed`.
//! `Cancelled` and `Failed` are the other terminal states.
//!
//! A driver has at most one active session. The [`PairingManager`] hands out
//! a claim per driver that the session holds until it reaches a terminal
//! state or is dropped. When the driver has a discovery strategy the session
//! owns a [`DiscoveryRun`] for its lifetime and stops it on the way out.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use hubkit_common::HubError;
use hubkit_common::config::Config;
use hubkit_common::device::{DeviceData, DeviceRecord};
use hubkit_common::discovery::DiscoveryResult;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use crate::discovery::{DiscoveryEngine, DiscoveryRun};
use crate::hooks::ListDevicesRequest;
use crate::instance::{DeviceInstance, DriverInstance, InitState};
use crate::lifecycle::LifecycleDispatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingState {
    Created,
    Listing,
    AwaitingSelection,
    Provisioning,
    Completed,
    Cancelled,
    Failed,
}

impl PairingState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

impl fmt::Display for PairingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Listing => "listing",
            Self::AwaitingSelection => "awaiting selection",
            Self::Provisioning => "provisioning",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        })
    }
}

/// How the UI names the candidate it picked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Index(usize),
    Data(DeviceData),
}

/// Marks a driver busy until dropped.
struct DriverClaim {
    active: Arc<Mutex<HashSet<String>>>,
    driver: String,
}

impl Drop for DriverClaim {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.driver);
        debug!(target: "hubkit::pairing", driver = %self.driver, "pairing claim released");
    }
}

/// Starts sessions and enforces one active session per driver.
#[derive(Clone)]
pub struct PairingManager {
    engine: Arc<DiscoveryEngine>,
    dispatcher: LifecycleDispatcher,
    active: Arc<Mutex<HashSet<String>>>,
}

impl PairingManager {
    pub fn new(engine: Arc<DiscoveryEngine>) -> Self {
        Self {
            engine,
            dispatcher: LifecycleDispatcher::new(),
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn is_pairing(&self, driver_id: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(driver_id)
    }

    /// Opens a session on `driver`.
    ///
    /// Fails with `SessionBusy` while another session of the driver is not
    /// terminal, and with `DiscoveryUnavailable` when the driver's strategy
    /// cannot bind.
    pub async fn start_session(&self, driver: &Arc<DriverInstance>) -> Result<PairingSession, HubError> {
        let claim = self.claim(driver.id())?;

        let discovery = match driver.strategy() {
            Some(strategy) => Some(self.engine.run(strategy).await?),
            None => None,
        };

        let session = PairingSession {
            id: format!("{:016x}", rand::random::<u64>()),
            driver: Arc::clone(driver),
            state: PairingState::Created,
            config: self.engine.config().clone(),
            dispatcher: self.dispatcher,
            candidates: Vec::new(),
            discovery,
            discovered: Vec::new(),
            awaiting_since: None,
            failure: None,
            claim: Some(claim),
        };
        info!(target: "hubkit::pairing", session = %session.id, driver = %driver.id(), "pairing session started");
        Ok(session)
    }

    fn claim(&self, driver_id: &str) -> Result<DriverClaim, HubError> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(driver_id.to_string()) {
            return Err(HubError::session_busy(driver_id));
        }
        Ok(DriverClaim {
            active: Arc::clone(&self.active),
            driver: driver_id.to_string(),
        })
    }
}

pub struct PairingSession {
    id: String,
    driver: Arc<DriverInstance>,
    state: PairingState,
    config: Config,
    dispatcher: LifecycleDispatcher,
    candidates: Vec<DeviceRecord>,
    discovery: Option<DiscoveryRun>,
    discovered: Vec<Arc<DiscoveryResult>>,
    awaiting_since: Option<Instant>,
    failure: Option<String>,
    claim: Option<DriverClaim>,
}

impl PairingSession {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> PairingState {
        self.state
    }

    pub fn driver(&self) -> &Arc<DriverInstance> {
        &self.driver
    }

    pub fn candidates(&self) -> &[DeviceRecord] {
        &self.candidates
    }

    /// Discovery results handed to the driver at listing time.
    pub fn discovered(&self) -> &[Arc<DiscoveryResult>] {
        &self.discovered
    }

    /// Whether the session still holds its driver.
    pub fn is_active(&self) -> bool {
        self.claim.is_some()
    }

    /// Why the session failed or was cancelled.
    pub fn reason(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Asks the driver for candidates. `Created → Listing → AwaitingSelection`.
    pub async fn list_devices(&mut self, view: impl Into<String>, params: Value) -> Result<&[DeviceRecord], HubError> {
        self.expect_state("list devices", PairingState::Created)?;
        self.state = PairingState::Listing;

        if self.driver.init_state() != InitState::Ready {
            let reason = format!("driver '{}' is not initialized", self.driver.id());
            return Err(self.fail(reason));
        }

        self.discovered = self.gather_discovery().await;
        let request = ListDevicesRequest {
            view: view.into(),
            params,
            discovered: self.discovered.clone(),
        };

        let listed = {
            let _guard = self.driver.gate().lock().await;
            self.driver
                .hooks()
                .on_pair_list_devices(&self.driver, request)
                .await
        };
        let candidates = match listed {
            Ok(candidates) => candidates,
            Err(e) => return Err(self.fail(format!("{e:#}"))),
        };
        if let Some(reason) = invalid_candidate(&candidates) {
            return Err(self.fail(reason));
        }

        debug!(target: "hubkit::pairing", session = %self.id, count = candidates.len(), "candidates listed");
        self.candidates = candidates;
        self.state = PairingState::AwaitingSelection;
        self.awaiting_since = Some(Instant::now());
        Ok(&self.candidates)
    }

    /// Provisions the picked candidate. `AwaitingSelection → Provisioning → Completed`.
    ///
    /// A selection that names no candidate is a `BadRequest` and leaves the
    /// session waiting. Past the selection deadline the session is cancelled.
    pub async fn select(&mut self, selection: Selection) -> Result<Arc<DeviceInstance>, HubError> {
        self.expect_state("select", PairingState::AwaitingSelection)?;
        if Instant::now() >= self.selection_deadline() {
            return Err(self.cancel_with("selection timed out"));
        }

        let record = match &selection {
            Selection::Index(index) => self.candidates.get(*index),
            Selection::Data(data) => self.candidates.iter().find(|record| record.data == *data),
        }
        .cloned()
        .ok_or_else(|| HubError::bad_request(format!("selection {selection:?} names no candidate")))?;

        self.state = PairingState::Provisioning;
        match self.provision(record).await {
            Ok(device) => {
                self.state = PairingState::Completed;
                self.release();
                info!(target: "hubkit::pairing", session = %self.id, device = %device.name(), "device paired");
                Ok(device)
            }
            Err(HubError::PairingFailed { reason }) => Err(self.fail(reason)),
            Err(e) => Err(self.fail(e.to_string())),
        }
    }

    /// Waits for the UI's selection and provisions it.
    ///
    /// Selections naming no candidate are ignored. A closed channel or the
    /// selection deadline cancels the session.
    pub async fn await_selection(
        &mut self,
        selections: &mut mpsc::Receiver<Selection>,
    ) -> Result<Arc<DeviceInstance>, HubError> {
        self.expect_state("await selection", PairingState::AwaitingSelection)?;
        let deadline = self.selection_deadline();
        loop {
            match timeout_at(deadline, selections.recv()).await {
                Ok(Some(selection)) => match self.select(selection).await {
                    Err(HubError::BadRequest { message }) => {
                        warn!(target: "hubkit::pairing", session = %self.id, "ignoring selection: {message}");
                    }
                    outcome => return outcome,
                },
                Ok(None) => return Err(self.cancel_with("pairing view closed")),
                Err(_elapsed) => return Err(self.cancel_with("selection timed out")),
            }
        }
    }

    /// Cancels a session that has not reached a terminal state.
    pub fn cancel(&mut self) -> Result<(), HubError> {
        if self.state.is_terminal() || self.state == PairingState::Provisioning {
            return Err(HubError::InvalidTransition {
                action: "cancel",
                state: self.state.to_string(),
            });
        }
        self.cancel_with("cancelled by user");
        Ok(())
    }

    async fn gather_discovery(&mut self) -> Vec<Arc<DiscoveryResult>> {
        let Some(run) = self.discovery.as_mut() else {
            return Vec::new();
        };
        let grace = Instant::now() + self.config.listing_grace;
        while let Ok(Some(_event)) = timeout_at(grace, run.next()).await {}
        run.results().to_vec()
    }

    async fn provision(&self, record: DeviceRecord) -> Result<Arc<DeviceInstance>, HubError> {
        if self.driver.device(&record.data).is_some() {
            return Err(HubError::pairing_failed(format!(
                "a device with data {:?} is already paired",
                record.data
            )));
        }
        let device = Arc::new(self.driver.map_device(record)?);
        self.dispatcher.initialize_isolated(&device).await?;
        self.driver.attach(Arc::clone(&device))?;

        {
            let _guard = device.gate().lock().await;
            if let Err(e) = device.hooks().on_added(&device).await {
                warn!(target: "hubkit::pairing", device = %device.name(), "on_added failed: {e:#}");
            }
        }
        Ok(device)
    }

    fn selection_deadline(&self) -> Instant {
        self.awaiting_since.unwrap_or_else(Instant::now) + self.config.selection_timeout
    }

    fn expect_state(&self, action: &'static str, expected: PairingState) -> Result<(), HubError> {
        if self.state != expected {
            return Err(HubError::InvalidTransition {
                action,
                state: self.state.to_string(),
            });
        }
        Ok(())
    }

    fn fail(&mut self, reason: String) -> HubError {
        warn!(target: "hubkit::pairing", session = %self.id, "pairing failed: {reason}");
        self.state = PairingState::Failed;
        self.failure = Some(reason.clone());
        self.release();
        HubError::pairing_failed(reason)
    }

    fn cancel_with(&mut self, reason: &str) -> HubError {
        debug!(target: "hubkit::pairing", session = %self.id, "pairing cancelled: {reason}");
        self.state = PairingState::Cancelled;
        self.failure = Some(reason.to_string());
        self.release();
        HubError::SessionCancelled {
            reason: reason.to_string(),
        }
    }

    /// Drops the discovery run and the driver claim.
    fn release(&mut self) {
        self.discovery = None;
        self.claim = None;
    }
}

/// Candidates must carry `data` and no two may share it.
fn invalid_candidate(candidates: &[DeviceRecord]) -> Option<String> {
    let mut seen = HashSet::new();
    for record in candidates {
        if record.data.is_empty() {
            return Some(format!("candidate '{}' has no data identifiers", record.name));
        }
        if !seen.insert(&record.data) {
            return Some(format!("candidates share data {:?}", record.data));
        }
    }
    None
}

impl fmt::Debug for PairingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PairingSession")
            .field("id", &self.id)
            .field("driver", &self.driver.id())
            .field("state", &self.state)
            .field("candidates", &self.candidates.len())
            .finish_non_exhaustive()
    }
}

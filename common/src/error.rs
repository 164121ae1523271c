//! Error taxonomy shared by the discovery engine, pairing sessions, the
//! lifecycle dispatcher and the request router.
//!
//! Every failure that crosses a component boundary is a [`HubError`]. Each
//! variant carries an HTTP-like status classification so the router can turn
//! it into an [`ErrorPayload`] without knowing where it came from.

use std::io;

use serde::Serialize;
use thiserror::Error;

pub type Result<T, E = HubError> = std::result::Result<T, E>;

/// Errors surfaced by hubkit components.
#[derive(Debug, Error)]
pub enum HubError {
    /// A discovery strategy could not start its listening mechanism.
    #[error("discovery strategy '{strategy}' unavailable: {source}")]
    DiscoveryUnavailable {
        strategy: String,
        #[source]
        source: io::Error,
    },

    /// A pairing session is already active on the driver.
    #[error("driver '{driver}' already has an active pairing session")]
    SessionBusy { driver: String },

    /// The enumeration callback or provisioning failed.
    #[error("pairing failed: {reason}")]
    PairingFailed { reason: String },

    /// The session was cancelled by the UI or timed out awaiting a selection.
    #[error("pairing cancelled: {reason}")]
    SessionCancelled { reason: String },

    /// An operation was attempted in a state that does not allow it.
    #[error("cannot {action} while session is {state}")]
    InvalidTransition { action: &'static str, state: String },

    /// The request violated the handler's parameter contract.
    #[error("bad request: {message}")]
    BadRequest { message: String },

    /// No handler is registered for the verb and path.
    #[error("no route for {verb} {path}")]
    NotFound { verb: String, path: String },

    /// A handler returned an error or panicked.
    #[error("handler '{handler}' failed ({status}): {message}")]
    HandlerError {
        handler: String,
        status: u16,
        message: String,
    },

    /// An init hook failed. The named instance and its dependents are not ready.
    #[error("{tier} '{id}' failed to initialize: {reason}")]
    InitFailed {
        tier: &'static str,
        id: String,
        reason: String,
    },

    /// The manifest or a strategy config is malformed.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// The running CPU architecture has no bundled dependency set.
    #[error("unsupported architecture: {arch}")]
    UnsupportedArch { arch: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HubError {
    /// HTTP-like status classification of the error.
    pub fn status(&self) -> u16 {
        match self {
            Self::BadRequest { .. } | Self::InvalidConfig { .. } | Self::Json(_) => 400,
            Self::NotFound { .. } => 404,
            Self::SessionBusy { .. }
            | Self::SessionCancelled { .. }
            | Self::InvalidTransition { .. } => 409,
            Self::PairingFailed { .. } => 422,
            Self::HandlerError { status, .. } => *status,
            Self::DiscoveryUnavailable { .. } => 503,
            Self::InitFailed { .. }
            | Self::UnsupportedArch { .. }
            | Self::Io(_) => 500,
        }
    }

    /// Stable machine readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DiscoveryUnavailable { .. } => "discovery_unavailable",
            Self::SessionBusy { .. } => "session_busy",
            Self::PairingFailed { .. } => "pairing_failed",
            Self::SessionCancelled { .. } => "session_cancelled",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::BadRequest { .. } => "bad_request",
            Self::NotFound { .. } => "not_found",
            Self::HandlerError { .. } => "handler_error",
            Self::InitFailed { .. } => "init_failed",
            Self::InvalidConfig { .. } => "invalid_config",
            Self::UnsupportedArch { .. } => "unsupported_arch",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }

    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            status: self.status(),
            code: self.code(),
            message: self.to_string(),
        }
    }

    pub fn discovery_unavailable(strategy: impl Into<String>, source: io::Error) -> Self {
        Self::DiscoveryUnavailable {
            strategy: strategy.into(),
            source,
        }
    }

    pub fn session_busy(driver: impl Into<String>) -> Self {
        Self::SessionBusy {
            driver: driver.into(),
        }
    }

    pub fn pairing_failed(reason: impl Into<String>) -> Self {
        Self::PairingFailed {
            reason: reason.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn init_failed(tier: &'static str, id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InitFailed {
            tier,
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

/// Structured error body returned to API callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    pub status: u16,
    pub code: &'static str,
    pub message: String,
}

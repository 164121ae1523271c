//! # hubkit-common
//!
//! Shared vocabulary of the hubkit workspace.
//!
//! ## Contents
//! * **[`discovery`]**: discovery results and strategy configuration.
//! * **[`device`]**: the [`device::DeviceRecord`] produced by pairing.
//! * **[`config`]**: runtime [`config::Config`] and the app manifest.
//! * **[`error`]**: the [`error::HubError`] taxonomy.
//! * **[`bootstrap`]**: bundled dependency path resolution.
//! * **[`network`]**: MAC prefixes, address ranges and probe targets.

pub mod bootstrap;
pub mod config;
pub mod device;
pub mod discovery;
pub mod error;
pub mod log;
pub mod network;

pub use error::{HubError, Result};

//! # hubkit core
//!
//! The runtime half of the toolkit: discovery strategies and the engine that
//! merges their sightings, the App/Driver/Device instance graph and its
//! lifecycle dispatcher, pairing sessions, discovery binding and the
//! capability request router.

pub mod binding;
pub mod discovery;
pub mod hooks;
pub mod instance;
pub mod lifecycle;
pub mod network;
pub mod pairing;
pub mod router;
pub mod vendors;

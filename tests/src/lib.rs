//! Cross-crate scenarios for the hubkit runtime.
#![cfg(test)]

mod discovery;
mod lifecycle;
mod pairing;
mod router;
mod support;

//! Network value types used by discovery strategies.

pub mod interface;
pub mod mac;
pub mod range;
pub mod target;

//! Wire codecs for the announcement based discovery strategies.
//!
//! * [`dns`]: one-shot mDNS service queries.
//! * [`mdns`]: service instances out of mDNS responses.
//! * [`ssdp`]: M-SEARCH requests and their responses.

pub mod dns;
pub mod mdns;
pub mod ssdp;

pub use mdns::ServiceInstance;
pub use ssdp::SsdpResponse;

use std::sync::OnceLock;

use mac_oui::Oui;
use pnet::util::MacAddr;
use tracing::warn;

/// Resolves the manufacturer behind a MAC address.
pub trait VendorLookup: Send + Sync {
    fn vendor(&self, mac: MacAddr) -> Option<String>;
}

static OUI_DB: OnceLock<Option<Oui>> = OnceLock::new();

fn oui_db() -> Option<&'static Oui> {
    OUI_DB
        .get_or_init(|| match Oui::default() {
            Ok(db) => Some(db),
            Err(e) => {
                warn!(target: "hubkit::vendors", "OUI database unavailable: {e}");
                None
            }
        })
        .as_ref()
}

/// Lookups against the OUI database bundled with `mac_oui`.
pub struct MacOuiRepo;

impl VendorLookup for MacOuiRepo {
    fn vendor(&self, mac: MacAddr) -> Option<String> {
        let db = oui_db()?;
        match db.lookup_by_mac(&mac.to_string()) {
            Ok(Some(entry)) => Some(entry.company_name.clone()),
            _ => None,
        }
    }
}

/// Never knows a vendor.
pub struct NoVendors;

impl VendorLookup for NoVendors {
    fn vendor(&self, _mac: MacAddr) -> Option<String> {
        None
    }
}

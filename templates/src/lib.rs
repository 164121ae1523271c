//! # Starter app
//!
//! The integration app new projects start from: one app, one driver that
//! offers a single device, and four widget endpoints backed by an in-memory
//! list. The CLI runs it when no app directory is given.

use std::sync::Arc;

use hubkit_common::HubError;
use hubkit_common::config::AppManifest;
use hubkit_core::hooks::{App, Driver};
use hubkit_core::instance::AppInstance;

pub mod api;
pub mod app;
pub mod device;
pub mod driver;

pub use app::MyApp;
pub use device::MyDevice;
pub use driver::MyDriver;

pub const TEMPLATE_MANIFEST: &str = r#"{
  "id": "com.example.myapp",
  "drivers": [
    { "id": "my_driver", "name": "My Driver" }
  ],
  "api": {
    "get_something": { "method": "GET", "path": "/" },
    "add_something": { "method": "POST", "path": "/" },
    "update_something": { "method": "PUT", "path": "/:id" },
    "delete_something": { "method": "DELETE", "path": "/:id" }
  }
}"#;

pub fn template_manifest() -> Result<AppManifest, HubError> {
    AppManifest::from_json(TEMPLATE_MANIFEST)
}

/// Builds the graph for `manifest`, running [`MyDriver`] for every declared driver.
pub fn build_app(manifest: &AppManifest) -> Result<(Arc<AppInstance>, Arc<MyApp>), HubError> {
    let state = Arc::new(MyApp::default());
    let hooks: Arc<dyn App> = state.clone();
    let app = AppInstance::from_manifest(manifest, hooks, |_| Some(Arc::new(MyDriver) as Arc<dyn Driver>))?;
    Ok((Arc::new(app), state))
}

//! # Bundled dependency bootstrap
//!
//! Apps ship one dependency bundle per CPU architecture next to their
//! sources. At start the process picks the bundle for the architecture it
//! runs on and puts it in front of the module search path.
//!
//! Resolution is the pure [`resolve_dependency_path`]. The search path
//! extension is recorded once per process in [`extend_search_path`] and is
//! never mutated afterwards.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

use tracing::debug;

use crate::error::HubError;

const BUNDLE_PREFIX: &str = "python_packages_manylinux_";

/// Architectures a dependency bundle exists for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    Amd64,
    Arm64,
}

impl Arch {
    /// The architecture of the running process.
    pub fn detect() -> Result<Self, HubError> {
        std::env::consts::ARCH.parse()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Amd64 => "amd64",
            Self::Arm64 => "arm64",
        }
    }
}

impl FromStr for Arch {
    type Err = HubError;

    /// Normalizes the names platforms report (`x86_64`, `AMD64`, `aarch64`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "amd64" | "x86_64" => Ok(Self::Amd64),
            "arm64" | "aarch64" => Ok(Self::Arm64),
            other => Err(HubError::UnsupportedArch { arch: other.into() }),
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The bundle directory for `arch` inside an app directory.
pub fn resolve_dependency_path(app_root: &Path, arch: Arch) -> PathBuf {
    app_root.join(format!("{BUNDLE_PREFIX}{arch}"))
}

static SEARCH_PATH: OnceLock<Vec<PathBuf>> = OnceLock::new();

/// Prepends `bundle` to `base` exactly once per process.
///
/// Later calls return the path computed by the first call, whatever they
/// pass in. The bundle is never inserted twice even when `base` already
/// contains it.
pub fn extend_search_path(bundle: PathBuf, base: Vec<PathBuf>) -> &'static [PathBuf] {
    SEARCH_PATH.get_or_init(|| {
        debug!(bundle = %bundle.display(), "extending module search path");
        prepend_unique(bundle, base)
    })
}

/// The process-wide search path, once [`extend_search_path`] has run.
pub fn search_path() -> Option<&'static [PathBuf]> {
    SEARCH_PATH.get().map(Vec::as_slice)
}

fn prepend_unique(bundle: PathBuf, base: Vec<PathBuf>) -> Vec<PathBuf> {
    if base.contains(&bundle) {
        return base;
    }
    let mut path = Vec::with_capacity(base.len() + 1);
    path.push(bundle);
    path.extend(base);
    path
}

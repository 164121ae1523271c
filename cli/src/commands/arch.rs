use std::path::{Path, PathBuf};

use colored::*;

use crate::terminal::{colors, print};
use hubkit_common::bootstrap::{self, Arch};
use hubkit_common::config::Config;

const SEARCH_PATH_VAR: &str = "PYTHONPATH";
const KEY_WIDTH: usize = 8;

pub fn arch(app: Option<&Path>, cfg: &Config) -> anyhow::Result<()> {
    let arch = Arch::detect()?;
    let root: PathBuf = match app {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir()?,
    };
    let bundle = bootstrap::resolve_dependency_path(&root, arch);
    let present = bundle.is_dir();

    let base: Vec<PathBuf> = std::env::var_os(SEARCH_PATH_VAR)
        .map(|raw| std::env::split_paths(&raw).collect())
        .unwrap_or_default();
    let search_path = bootstrap::extend_search_path(bundle.clone(), base);

    print::header("dependency bundle", cfg.quiet);
    print::aligned_line("Arch", arch.as_str().color(colors::ACCENT), KEY_WIDTH);
    print::aligned_line("Bundle", bundle.display().to_string(), KEY_WIDTH);
    let status = if present { "present".color(colors::STATUS_OK) } else { "missing".color(colors::STATUS_ERR) };
    print::aligned_line("Status", status, KEY_WIDTH);
    for (idx, entry) in search_path.iter().enumerate() {
        print::aligned_line(&format!("Path[{idx}]"), entry.display().to_string(), KEY_WIDTH);
    }
    Ok(())
}

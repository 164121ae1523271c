pub mod api;
pub mod arch;
pub mod discover;
pub mod pair;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use hubkit_common::config::{AppManifest, Config};
use hubkit_core::router::Verb;

#[derive(Parser)]
#[command(name = "hubkit")]
#[command(about = "Run and poke at smart-home integration apps.")]
pub struct CommandLine {
    #[command(subcommand)]
    pub command: Commands,

    /// App directory holding `app.json`. Defaults to the bundled starter app
    #[arg(long, global = true)]
    pub app: Option<PathBuf>,

    /// Print less; repeat to print results only
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub quiet: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one discovery strategy and list what answered
    #[command(alias = "d")]
    Discover {
        /// Strategy id from the manifest, or a path to a strategy JSON file
        strategy: String,
    },
    /// Pair a device through a driver
    #[command(alias = "p")]
    Pair {
        driver: String,
        /// Pairing view name handed to the driver
        #[arg(long, default_value = "list_devices")]
        view: String,
    },
    /// Send one widget API request to the app
    #[command(alias = "a")]
    Api {
        method: Verb,
        path: String,
        #[arg(long = "query", value_parser = parse_key_val)]
        query: Vec<(String, String)>,
        #[arg(long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,
        /// JSON request body
        #[arg(long)]
        body: Option<String>,
    },
    /// Show the dependency bundle picked for this machine
    Arch,
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn config(&self) -> Config {
        Config {
            quiet: self.quiet,
            ..Config::default()
        }
    }
}

fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// The manifest of `--app`, or the starter app's when none is given.
pub fn load_manifest(app: Option<&Path>) -> anyhow::Result<AppManifest> {
    match app {
        Some(dir) => AppManifest::load(dir).with_context(|| format!("loading app from {}", dir.display())),
        None => Ok(hubkit_templates::template_manifest()?),
    }
}

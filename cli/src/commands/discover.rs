use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use colored::*;
use tracing::info_span;

use crate::hprint;
use crate::terminal::{colors, format, print, spinner};
use hubkit_common::config::Config;
use hubkit_common::discovery::{DiscoveryResult, StrategyConfig};
use hubkit_common::success;
use hubkit_core::discovery::DiscoveryEngine;

pub async fn discover(strategy: &str, app: Option<&Path>, cfg: &Config) -> anyhow::Result<()> {
    let config = resolve_strategy(strategy, app)?;
    let engine = DiscoveryEngine::new(cfg.clone());

    let span = info_span!("discovery", indicatif.pb_show = true);
    spinner::attach(&span, &format!("Listening for {} devices...", config.kind()));
    let guard = span.enter();

    let start_time: Instant = Instant::now();
    let mut run = engine.run(&config).await?;
    while run.next().await.is_some() {
        spinner::report_discovery_progress(&span, run.results().len());
    }
    let mut results: Vec<Arc<DiscoveryResult>> = run.results().to_vec();

    drop(guard);
    drop(span);

    discovery_ends(&mut results, start_time.elapsed(), cfg);
    Ok(())
}

/// A strategy id from the manifest, or a JSON file holding one strategy.
fn resolve_strategy(strategy: &str, app: Option<&Path>) -> anyhow::Result<StrategyConfig> {
    let as_file = Path::new(strategy);
    if as_file.extension().is_some_and(|ext| ext == "json") {
        let raw = std::fs::read_to_string(as_file).with_context(|| format!("reading {strategy}"))?;
        return serde_json::from_str(&raw).with_context(|| format!("parsing strategy in {strategy}"));
    }

    let manifest = super::load_manifest(app)?;
    if let Some(config) = manifest.discovery.get(strategy) {
        return Ok(config.clone());
    }
    let known: Vec<&str> = manifest.discovery.keys().map(String::as_str).collect();
    if known.is_empty() {
        bail!("app '{}' declares no discovery strategies", manifest.id);
    }
    bail!("unknown discovery strategy '{strategy}' (known: {})", known.join(", "))
}

fn discovery_ends(results: &mut [Arc<DiscoveryResult>], total_time: Duration, cfg: &Config) {
    if results.is_empty() {
        print::header("zero devices detected", cfg.quiet);
        print::no_results("devices");
        return;
    }

    if cfg.quiet > 0 {
        hprint!();
    }

    print::header("discovery results", cfg.quiet);
    results.sort_by(|a, b| a.address.cmp(&b.address).then_with(|| a.id.cmp(&b.id)));
    print_results(results, cfg);
    print_summary(results.len(), total_time, cfg);
}

fn print_results(results: &[Arc<DiscoveryResult>], cfg: &Config) {
    for (idx, result) in results.iter().enumerate() {
        match cfg.quiet {
            2 => print::print(&result.id),
            _ => {
                print::tree_head(idx, &result.id);
                print::as_tree_one_level(format::result_to_details(result));
            }
        }
        if idx + 1 != results.len() && cfg.quiet < 2 {
            hprint!();
        }
    }
}

fn print_summary(count: usize, total_time: Duration, cfg: &Config) {
    let devices: ColoredString = format!("{count} devices").bold().green();
    let total_time: ColoredString = format!("{:.2}s", total_time.as_secs_f64()).bold().yellow();
    let output: &ColoredString =
        &format!("Discovery Complete: {devices} identified in {total_time}").color(colors::TEXT_DEFAULT);

    match cfg.quiet {
        0 => {
            print::fat_separator();
            print::centerln(output);
        }
        _ => {
            hprint!();
            success!("{}", output)
        }
    }
}

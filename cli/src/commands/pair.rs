use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use colored::*;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{info_span, warn};

use crate::terminal::{colors, format, print, spinner};
use hubkit_common::config::Config;
use hubkit_common::success;
use hubkit_core::discovery::DiscoveryEngine;
use hubkit_core::lifecycle::LifecycleDispatcher;
use hubkit_core::pairing::{PairingManager, Selection};

pub async fn pair(driver_id: &str, view: &str, app: Option<&Path>, cfg: &Config) -> anyhow::Result<()> {
    let manifest = super::load_manifest(app)?;
    let (app, _state) = hubkit_templates::build_app(&manifest)?;
    let dispatcher = LifecycleDispatcher::new();
    let report = dispatcher.initialize_app(&app).await?;
    for failure in &report.failures {
        warn!("{failure}");
    }

    let driver = app
        .driver(driver_id)
        .with_context(|| format!("app '{}' has no driver '{driver_id}'", app.id()))?;
    let manager = PairingManager::new(Arc::new(DiscoveryEngine::new(cfg.clone())));
    let mut session = manager.start_session(driver).await?;

    let span = info_span!("pairing", indicatif.pb_show = true);
    spinner::attach(&span, &format!("Asking {} for devices...", driver.name().bold()));
    let listed = {
        let _guard = span.enter();
        session.list_devices(view, json!({})).await.map(<[_]>::to_vec)
    };
    drop(span);
    let candidates = listed?;

    if candidates.is_empty() {
        session.cancel()?;
        print::header("nothing to pair", cfg.quiet);
        print::no_results("devices");
        dispatcher.teardown(&app).await;
        return Ok(());
    }

    print::header("pairing candidates", cfg.quiet);
    for (idx, record) in candidates.iter().enumerate() {
        print::tree_head(idx, &record.name);
        print::as_tree_one_level(format::record_to_details(record));
    }
    print::print_status(format!(
        "pick a device by index, or press enter to cancel [{}]",
        format!("0-{}", candidates.len() - 1).color(colors::ACCENT)
    ));

    let mut selections = read_selections();
    let outcome = session.await_selection(&mut selections).await;
    let result = match outcome {
        Ok(device) => {
            let record = device.to_record().await;
            print::header("device paired", cfg.quiet);
            print::tree_head(0, &record.name);
            print::as_tree_one_level(format::record_to_details(&record));
            success!("{} is paired with {}", record.name.bold(), driver.name().bold());
            Ok(())
        }
        Err(e) => Err(anyhow!(e).context(format!("pairing with {} did not complete", driver.id()))),
    };

    dispatcher.teardown(&app).await;
    result
}

/// Forwards index lines from stdin until an empty line or end of input.
///
/// Runs on a plain thread so a pending read never holds up runtime shutdown.
fn read_selections() -> mpsc::Receiver<Selection> {
    let (tx, rx) = mpsc::channel(1);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let line = line.trim();
            if line.is_empty() {
                break;
            }
            match line.parse::<usize>() {
                Ok(index) => {
                    if tx.blocking_send(Selection::Index(index)).is_err() {
                        break;
                    }
                }
                Err(_) => print::print_status(format!("'{}' is not an index", line.color(colors::STATUS_ERR))),
            }
        }
    });
    rx
}

use std::path::Path;

use anyhow::Context;
use colored::*;
use serde_json::Value;

use crate::terminal::{colors, print};
use hubkit_common::config::Config;
use hubkit_core::lifecycle::LifecycleDispatcher;
use hubkit_core::router::{ApiRequest, CapabilityRouter, Verb};

pub struct ApiCall {
    pub method: Verb,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub params: Vec<(String, String)>,
    pub body: Option<String>,
}

pub async fn api(call: ApiCall, app: Option<&Path>, cfg: &Config) -> anyhow::Result<()> {
    let manifest = super::load_manifest(app)?;
    let (app, state) = hubkit_templates::build_app(&manifest)?;
    LifecycleDispatcher::new().initialize_app(&app).await?;

    let mut router = CapabilityRouter::new(app, state);
    hubkit_templates::api::register(&mut router, &manifest.api)?;

    let request = build_request(call)?;
    let line = format!("{} {}", request.verb, request.path);
    let response = router.respond(request).await;

    print::header("api response", cfg.quiet);
    let status_color = if response.status < 400 { colors::STATUS_OK } else { colors::STATUS_ERR };
    print::aligned_line("Request", line, 7);
    print::aligned_line("Status", response.status.to_string().color(status_color).bold(), 7);
    print::print(&serde_json::to_string_pretty(&response.body)?);
    Ok(())
}

fn build_request(call: ApiCall) -> anyhow::Result<ApiRequest> {
    let mut request = ApiRequest::new(call.method, call.path);
    for (key, value) in call.query {
        request = request.with_query(key, value);
    }
    for (key, value) in call.params {
        request = request.with_param(key, value);
    }
    if let Some(raw) = call.body {
        let body: Value = serde_json::from_str(&raw).context("request body is not valid JSON")?;
        request = request.with_body(body);
    }
    Ok(request)
}

//! Widget endpoints of the starter app.

use std::collections::BTreeMap;
use std::sync::Arc;

use hubkit_common::HubError;
use hubkit_common::config::ApiRouteManifest;
use hubkit_core::router::{ApiContext, ApiError, ApiRequest, CapabilityRouter, ParamContract};
use serde_json::{Map, Value, json};

use crate::app::MyApp;

pub type Context = ApiContext<Arc<MyApp>>;

pub async fn get_something(_request: ApiRequest, ctx: Context) -> Result<Value, ApiError> {
    Ok(ctx.state.greeting())
}

pub async fn add_something(request: ApiRequest, ctx: Context) -> Result<Value, ApiError> {
    let fields = body_fields(request.body)?;
    Ok(ctx.state.add_something(fields).await)
}

pub async fn update_something(request: ApiRequest, ctx: Context) -> Result<Value, ApiError> {
    let id = item_id(&request)?;
    let fields = body_fields(request.body)?;
    ctx.state
        .update_something(id, fields)
        .await
        .ok_or_else(|| ApiError::not_found(format!("no item {id}")))
}

pub async fn delete_something(request: ApiRequest, ctx: Context) -> Result<Value, ApiError> {
    let id = item_id(&request)?;
    ctx.state
        .delete_something(id)
        .await
        .map(|item| json!({ "deleted": item }))
        .ok_or_else(|| ApiError::not_found(format!("no item {id}")))
}

fn item_id(request: &ApiRequest) -> Result<u64, ApiError> {
    let raw = request.params.get("id").map(String::as_str).unwrap_or_default();
    raw.parse()
        .map_err(|_| ApiError::bad_request(format!("'{raw}' is not an item id")))
}

fn body_fields(body: Value) -> Result<Map<String, Value>, ApiError> {
    match body {
        Value::Object(fields) => Ok(fields),
        _ => Err(ApiError::bad_request("body must be a JSON object")),
    }
}

/// Binds the four endpoints at the routes the manifest declares.
pub fn register(
    router: &mut CapabilityRouter<Arc<MyApp>>,
    api: &BTreeMap<String, ApiRouteManifest>,
) -> Result<(), HubError> {
    router
        .register_from_manifest(api, "get_something", ParamContract::new(), get_something)?
        .register_from_manifest(
            api,
            "add_something",
            ParamContract::new().body_field("name"),
            add_something,
        )?
        .register_from_manifest(
            api,
            "update_something",
            ParamContract::new().param("id"),
            update_something,
        )?
        .register_from_manifest(
            api,
            "delete_something",
            ParamContract::new().param("id"),
            delete_something,
        )?;
    Ok(())
}

//! # Capability Request Router
//!
//! Maps widget and API calls to named handlers by exact `(verb, path)`.
//!
//! Every route carries a [`ParamContract`]. A request missing a required
//! query key, path parameter or body field is refused with `BadRequest`
//! before its handler runs. Handlers run in their own task, so a panicking
//! handler comes back as a status 500 `HandlerError` instead of taking the
//! router down.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use hubkit_common::HubError;
use hubkit_common::config::ApiRouteManifest;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::instance::AppInstance;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Post,
    Put,
    Delete,
}

impl FromStr for Verb {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            other => Err(HubError::bad_request(format!("unsupported method '{other}'"))),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        })
    }
}

/// Keys a handler cannot run without.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamContract {
    query: Vec<String>,
    params: Vec<String>,
    body: Vec<String>,
}

impl ParamContract {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, key: impl Into<String>) -> Self {
        self.query.push(key.into());
        self
    }

    pub fn param(mut self, key: impl Into<String>) -> Self {
        self.params.push(key.into());
        self
    }

    /// Requires the body to be an object with a non-null `field`.
    pub fn body_field(mut self, field: impl Into<String>) -> Self {
        self.body.push(field.into());
        self
    }

    pub fn check(&self, request: &ApiRequest) -> Result<(), HubError> {
        if let Some(key) = self.query.iter().find(|key| !request.query.contains_key(*key)) {
            return Err(HubError::bad_request(format!("missing query key '{key}'")));
        }
        if let Some(key) = self.params.iter().find(|key| !request.params.contains_key(*key)) {
            return Err(HubError::bad_request(format!("missing path parameter '{key}'")));
        }
        if let Some(field) = self
            .body
            .iter()
            .find(|field| request.body.get(field.as_str()).is_none_or(Value::is_null))
        {
            return Err(HubError::bad_request(format!("missing body field '{field}'")));
        }
        Ok(())
    }
}

/// A call as it arrives from a widget or the API surface.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub verb: Verb,
    pub path: String,
    pub query: BTreeMap<String, String>,
    pub params: BTreeMap<String, String>,
    pub body: Value,
}

impl ApiRequest {
    pub fn new(verb: Verb, path: impl Into<String>) -> Self {
        Self {
            verb,
            path: path.into(),
            query: BTreeMap::new(),
            params: BTreeMap::new(),
            body: Value::Null,
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }
}

/// What a handler sees besides the request: the app graph and shared state.
pub struct ApiContext<S> {
    pub app: Arc<AppInstance>,
    pub state: S,
}

/// Error a handler returns. Becomes a `HandlerError` with the same status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: u16,
    pub message: String,
}

impl ApiError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(500, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.status)
    }
}

impl std::error::Error for ApiError {}

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, ApiError>> + Send>>;

pub trait Handler<S>: Send + Sync + 'static {
    fn call(&self, request: ApiRequest, context: ApiContext<S>) -> HandlerFuture;
}

impl<S, F, Fut> Handler<S> for F
where
    F: Fn(ApiRequest, ApiContext<S>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ApiError>> + Send + 'static,
{
    fn call(&self, request: ApiRequest, context: ApiContext<S>) -> HandlerFuture {
        Box::pin(self(request, context))
    }
}

struct Route<S> {
    name: String,
    contract: ParamContract,
    handler: Arc<dyn Handler<S>>,
}

/// Status and JSON body of a dispatched request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

pub struct CapabilityRouter<S> {
    app: Arc<AppInstance>,
    state: S,
    routes: HashMap<(Verb, String), Route<S>>,
}

impl<S> CapabilityRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new(app: Arc<AppInstance>, state: S) -> Self {
        Self {
            app,
            state,
            routes: HashMap::new(),
        }
    }

    pub fn register<H>(
        &mut self,
        name: impl Into<String>,
        verb: Verb,
        path: &str,
        contract: ParamContract,
        handler: H,
    ) -> Result<&mut Self, HubError>
    where
        H: Handler<S>,
    {
        let name = name.into();
        let key = (verb, normalize_path(path));
        if let Some(existing) = self.routes.get(&key) {
            return Err(HubError::invalid_config(format!(
                "{verb} {} is already bound to '{}'",
                key.1, existing.name
            )));
        }
        debug!(target: "hubkit::router", handler = %name, %verb, path = %key.1, "route registered");
        self.routes.insert(
            key,
            Route {
                name,
                contract,
                handler: Arc::new(handler),
            },
        );
        Ok(self)
    }

    /// Registers `name` at the method and path the manifest's `api` section gives it.
    pub fn register_from_manifest<H>(
        &mut self,
        api: &BTreeMap<String, ApiRouteManifest>,
        name: &str,
        contract: ParamContract,
        handler: H,
    ) -> Result<&mut Self, HubError>
    where
        H: Handler<S>,
    {
        let route = api
            .get(name)
            .ok_or_else(|| HubError::invalid_config(format!("manifest declares no api handler '{name}'")))?;
        let verb: Verb = route
            .method
            .parse()
            .map_err(|_| HubError::invalid_config(format!("handler '{name}' has unsupported method '{}'", route.method)))?;
        self.register(name, verb, &route.path, contract, handler)
    }

    pub fn routes(&self) -> impl Iterator<Item = (Verb, &str, &str)> {
        self.routes
            .iter()
            .map(|((verb, path), route)| (*verb, path.as_str(), route.name.as_str()))
    }

    pub async fn dispatch(&self, request: ApiRequest) -> Result<Value, HubError> {
        let path = normalize_path(&request.path);
        let Some(route) = self.routes.get(&(request.verb, path.clone())) else {
            return Err(HubError::NotFound {
                verb: request.verb.to_string(),
                path,
            });
        };
        route.contract.check(&request)?;

        let context = ApiContext {
            app: Arc::clone(&self.app),
            state: self.state.clone(),
        };
        let call = route.handler.call(request, context);
        let mut task = AbortOnDrop(tokio::spawn(call));
        match (&mut task.0).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(HubError::HandlerError {
                handler: route.name.clone(),
                status: e.status,
                message: e.message,
            }),
            Err(join) => {
                warn!(target: "hubkit::router", handler = %route.name, "handler aborted: {join}");
                Err(HubError::HandlerError {
                    handler: route.name.clone(),
                    status: 500,
                    message: "handler panicked".into(),
                })
            }
        }
    }

    /// Dispatches and renders failures as their structured payload.
    pub async fn respond(&self, request: ApiRequest) -> ApiResponse {
        match self.dispatch(request).await {
            Ok(body) => ApiResponse { status: 200, body },
            Err(e) => ApiResponse {
                status: e.status(),
                body: serde_json::to_value(e.to_payload()).unwrap_or(Value::Null),
            },
        }
    }
}

/// Aborts the handler task when the dispatch future is dropped mid-call.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

//! Declarative worker runtime
//!
//! Worker source is a JSON document declaring a version, what to do on
//! install and activate, a list of fetch routes and a message policy:
//!
//! ```json
//! {
//!   "version": "v1",
//!   "install": { "precache": { "cache": "static-v1", "urls": ["/", "/app.js"] } },
//!   "activate": { "keep_caches": ["static-v1"] },
//!   "routes": [
//!     { "match": "^/api/", "strategy": "network" },
//!     { "match": "^/hello$", "strategy": "static",
//!       "response": { "status": 200, "body": "hi" } },
//!     { "match": "\\.js$", "strategy": "cache_first", "cache": "static-v1" }
//!   ],
//!   "messages": "echo"
//! }
//! ```
//!
//! Every [`ScriptRuntime::build`] call compiles a fresh [`ScriptWorker`]; the
//! only state shared between versions is what the [`WorkerScope`] carries.

use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::error::{DispatchError, LoadError, WorkerResult};
use crate::event::{Event, ExtendableEvent, FetchEvent, MessageEvent};
use crate::fetch::{FetchRequest, FetchResponse};
use crate::strategy::Strategy;
use crate::worker::{Worker, WorkerHandle, WorkerRuntime, WorkerScope};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WorkerSource {
    version: String,
    #[serde(default)]
    install: InstallStep,
    #[serde(default)]
    activate: ActivateStep,
    #[serde(default)]
    routes: Vec<RouteSource>,
    #[serde(default)]
    messages: MessagePolicy,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct InstallStep {
    precache: Option<Precache>,
    #[serde(default)]
    fail: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct Precache {
    cache: String,
    urls: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ActivateStep {
    keep_caches: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RouteSource {
    #[serde(rename = "match")]
    pattern: String,
    strategy: StrategyKind,
    cache: Option<String>,
    response: Option<StaticResponse>,
    #[serde(default)]
    navigate_only: bool,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum StrategyKind {
    Network,
    Static,
    CacheOnly,
    CacheFirst,
    NetworkFirst,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StaticResponse {
    #[serde(default = "default_status")]
    status: u16,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    body: String,
}

fn default_status() -> u16 {
    200
}

/// What a worker does with messages from the control channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagePolicy {
    /// Post the message back to every control connection
    #[default]
    Echo,
    /// Log it under the `sw` target
    Log,
    /// Drop it
    Ignore,
}

struct Route {
    pattern: Regex,
    navigate_only: bool,
    /// `None` leaves matching requests to the network
    strategy: Option<Strategy>,
}

impl Route {
    fn compile(source: RouteSource) -> Result<Self, LoadError> {
        let pattern = Regex::new(&source.pattern).map_err(|e| LoadError::InvalidPattern {
            pattern: source.pattern.clone(),
            reason: e.to_string(),
        })?;
        let need_cache = |strategy: &'static str| {
            source.cache.clone().ok_or_else(|| LoadError::MissingField {
                pattern: source.pattern.clone(),
                strategy,
                field: "cache",
            })
        };
        let strategy = match source.strategy {
            StrategyKind::Network => None,
            StrategyKind::Static => {
                let response = source.response.as_ref().ok_or_else(|| LoadError::MissingField {
                    pattern: source.pattern.clone(),
                    strategy: "static",
                    field: "response",
                })?;
                Some(Strategy::Static(static_response(&source.pattern, response)?))
            }
            StrategyKind::CacheOnly => Some(Strategy::CacheOnly {
                cache: need_cache("cache_only")?,
            }),
            StrategyKind::CacheFirst => Some(Strategy::CacheFirst {
                cache: need_cache("cache_first")?,
            }),
            StrategyKind::NetworkFirst => Some(Strategy::NetworkFirst {
                cache: need_cache("network_first")?,
            }),
        };
        Ok(Self {
            pattern,
            navigate_only: source.navigate_only,
            strategy,
        })
    }

    fn matches(&self, event: &FetchEvent) -> bool {
        if self.navigate_only && !event.is_navigate() {
            return false;
        }
        self.pattern.is_match(event.request().path())
    }
}

fn static_response(pattern: &str, source: &StaticResponse) -> Result<FetchResponse, LoadError> {
    if !(100..=599).contains(&source.status) {
        return Err(LoadError::InvalidStatus {
            pattern: pattern.to_string(),
            status: source.status,
        });
    }
    let mut headers = HeaderMap::new();
    for (name, value) in &source.headers {
        let invalid = || LoadError::InvalidHeader {
            pattern: pattern.to_string(),
            name: name.clone(),
        };
        let header = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        headers.append(header, value);
    }
    let mut response = FetchResponse::new(source.status, source.body.clone());
    response.headers = headers;
    Ok(response)
}

/// Runtime for declarative JSON workers
#[derive(Debug, Clone)]
pub struct ScriptRuntime {
    scope: WorkerScope,
}

impl ScriptRuntime {
    /// Create a runtime whose workers all receive `scope`
    pub fn new(scope: WorkerScope) -> Self {
        Self { scope }
    }
}

impl WorkerRuntime for ScriptRuntime {
    fn build(&self, source: &str) -> WorkerResult<WorkerHandle> {
        Ok(Arc::new(ScriptWorker::compile(source, self.scope.clone())?))
    }
}

/// A compiled declarative worker
pub struct ScriptWorker {
    version: String,
    precache: Option<Precache>,
    fail_install: bool,
    keep_caches: Option<Vec<String>>,
    routes: Vec<Route>,
    messages: MessagePolicy,
    scope: WorkerScope,
}

impl ScriptWorker {
    /// Parse and compile worker source
    pub fn compile(source: &str, scope: WorkerScope) -> Result<Self, LoadError> {
        let parsed: WorkerSource = serde_json::from_str(source)?;
        if parsed.version.trim().is_empty() {
            return Err(LoadError::MissingVersion);
        }
        let routes = parsed
            .routes
            .into_iter()
            .map(Route::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            version: parsed.version,
            precache: parsed.install.precache,
            fail_install: parsed.install.fail,
            keep_caches: parsed.activate.keep_caches,
            routes,
            messages: parsed.messages,
            scope,
        })
    }

    /// Number of compiled routes
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Message policy
    pub fn message_policy(&self) -> MessagePolicy {
        self.messages
    }

    fn spawn<F>(&self, event: &'static str, work: F) -> Result<(), DispatchError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = Handle::try_current().map_err(|_| DispatchError::NoRuntime(event))?;
        handle.spawn(work);
        Ok(())
    }

    fn on_install(&self, event: &ExtendableEvent) -> Result<(), DispatchError> {
        if self.fail_install {
            event.wait_until().reject("worker declares a failing install");
            return Ok(());
        }
        let Some(precache) = self.precache.clone() else {
            return Ok(());
        };
        let done = event.wait_until();
        let scope = self.scope.clone();
        let version = self.version.clone();
        self.spawn("install", async move {
            match precache_all(&scope, &precache).await {
                Ok(count) => {
                    info!(target: "sw", %version, cache = %precache.cache, count, "precached");
                    done.resolve(());
                }
                Err(reason) => {
                    warn!(target: "sw", %version, %reason, "precache failed");
                    done.reject(reason);
                }
            }
        })
    }

    fn on_activate(&self, event: &ExtendableEvent) -> Result<(), DispatchError> {
        let Some(keep) = &self.keep_caches else {
            return Ok(());
        };
        let done = event.wait_until();
        for name in self.scope.caches.keys() {
            if !keep.contains(&name) {
                self.scope.caches.delete(&name);
                info!(target: "sw", version = %self.version, cache = %name, "deleted cache");
            }
        }
        done.resolve(());
        Ok(())
    }

    fn on_fetch(&self, event: &FetchEvent) -> Result<(), DispatchError> {
        let Some(route) = self.routes.iter().find(|route| route.matches(event)) else {
            return Ok(());
        };
        let Some(strategy) = route.strategy.as_ref() else {
            return Ok(());
        };
        if !strategy.claims(event.request()) {
            return Ok(());
        }
        if let Strategy::Static(response) = strategy {
            event.respond(response.clone());
            return Ok(());
        }
        let responder = event.respond_with();
        let strategy = strategy.clone();
        let scope = self.scope.clone();
        let request = event.request().clone();
        self.spawn("fetch", async move {
            let response = strategy.respond(&scope, request).await;
            responder.resolve(response);
        })
    }

    fn on_message(&self, event: &MessageEvent) -> Result<(), DispatchError> {
        match self.messages {
            MessagePolicy::Echo => {
                let delivered = self.scope.messenger.broadcast(&serde_json::json!({
                    "type": "message",
                    "version": self.version,
                    "data": event.data(),
                }));
                info!(target: "sw", version = %self.version, delivered, "echoed message");
            }
            MessagePolicy::Log => {
                info!(target: "sw", version = %self.version, data = %event.data(), "message");
            }
            MessagePolicy::Ignore => {}
        }
        Ok(())
    }
}

async fn precache_all(scope: &WorkerScope, precache: &Precache) -> Result<usize, String> {
    let cache = scope.caches.open(&precache.cache);
    for url in &precache.urls {
        let request = FetchRequest::get(&scope.origin, url);
        let response = scope
            .fetch
            .fetch(request.clone())
            .await
            .map_err(|e| format!("{}: {}", url, e))?;
        if !response.ok() {
            return Err(format!("{}: upstream answered {}", url, response.status));
        }
        cache.put(&request, response).map_err(|e| e.to_string())?;
    }
    Ok(precache.urls.len())
}

impl Worker for ScriptWorker {
    fn version(&self) -> &str {
        &self.version
    }

    fn dispatch_event(&self, event: &Event) -> Result<(), DispatchError> {
        match event {
            Event::Install(e) => self.on_install(e),
            Event::Activate(e) => self.on_activate(e),
            Event::Fetch(e) => self.on_fetch(e),
            Event::Message(e) => self.on_message(e),
        }
    }
}

impl std::fmt::Debug for ScriptWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptWorker")
            .field("version", &self.version)
            .field("routes", &self.routes.len())
            .field("messages", &self.messages)
            .finish()
    }
}

//! Listener, routing and startup

use axum::body::Body;
use axum::extract::{FromRequestParts, Request, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use axum::Router;
use http::header::UPGRADE;
use lifecycle::LifecycleManager;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use worker_runtime::{CacheStorage, Messenger, ScriptRuntime, WorkerRuntime, WorkerScope};

use crate::config::Config;
use crate::control;
use crate::error::{ServerError, ServerResult};
use crate::navigation::NavigationFlag;
use crate::network::NetworkClient;
use crate::pipeline::Dispatcher;
use crate::watcher;

/// Shared server state
#[derive(Clone)]
pub struct AppState {
    /// Lifecycle owner
    pub lifecycle: Arc<LifecycleManager>,
    /// Request pipeline
    pub dispatcher: Dispatcher,
    /// Navigation marker shared with the control channel
    pub navigation: Arc<NavigationFlag>,
    /// Control connection registry
    pub messenger: Arc<Messenger>,
}

impl AppState {
    /// Build state running declarative workers
    pub fn new(config: &Config) -> ServerResult<Self> {
        let network = NetworkClient::new(config)?;
        let messenger = Arc::new(Messenger::new());
        let scope = WorkerScope {
            origin: config.origin.clone(),
            caches: Arc::new(CacheStorage::new()),
            fetch: Arc::new(network.clone()),
            messenger: Arc::clone(&messenger),
        };
        let runtime = Arc::new(ScriptRuntime::new(scope));
        Ok(Self::with_runtime(config, runtime, network, messenger))
    }

    /// Build state around any worker runtime
    pub fn with_runtime(
        config: &Config,
        runtime: Arc<dyn WorkerRuntime>,
        network: NetworkClient,
        messenger: Arc<Messenger>,
    ) -> Self {
        let lifecycle = Arc::new(LifecycleManager::new(runtime, config.lifecycle));
        let navigation = Arc::new(NavigationFlag::new());
        let dispatcher = Dispatcher::new(
            Arc::clone(&lifecycle),
            network,
            Arc::clone(&navigation),
            config.origin.clone(),
            config.respond_timeout,
        );
        Self {
            lifecycle,
            dispatcher,
            navigation,
            messenger,
        }
    }
}

/// Every path goes through one handler: upgrades become control
/// connections, everything else is dispatched.
pub fn router(state: AppState) -> Router {
    Router::new().fallback(handle).with_state(state)
}

async fn handle(State(state): State<AppState>, request: Request) -> Response {
    if !is_websocket_upgrade(&request) {
        return state.dispatcher.handle(request).await;
    }
    let (mut parts, _body) = request.into_parts();
    match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
        Ok(ws) => ws.on_upgrade(move |socket| control::serve_connection(socket, state)),
        Err(rejection) => rejection.into_response(),
    }
}

fn is_websocket_upgrade(request: &Request<Body>) -> bool {
    request
        .headers()
        .get(UPGRADE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case("websocket"))
}

/// Read the worker file and hand it to the lifecycle manager.
///
/// A load error is logged and requests go to the network until a good
/// version shows up.
pub fn load_worker(lifecycle: &LifecycleManager, path: &Path) -> ServerResult<()> {
    let source = std::fs::read_to_string(path).map_err(|source| ServerError::ReadWorker {
        path: path.to_path_buf(),
        source,
    })?;
    if let Err(err) = lifecycle.reload(&source) {
        error!(path = %path.display(), error = %err, "initial worker failed to load");
    }
    Ok(())
}

/// Run the server until Ctrl-C
pub async fn run(config: Config) -> ServerResult<()> {
    let state = AppState::new(&config)?;
    load_worker(&state.lifecycle, &config.worker_path)?;

    let _watcher = if config.watch {
        Some(watcher::watch(&config.worker_path, Arc::clone(&state.lifecycle))?)
    } else {
        None
    };

    let addr = config.listen_addr();
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    info!(
        %addr,
        origin = %config.origin,
        upstream = %config.upstream_base,
        worker = %config.worker_path.display(),
        "listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServerError::Serve)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

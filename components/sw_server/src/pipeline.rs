//! Request dispatch pipeline
//!
//! Each inbound request becomes a [`RequestContext`] and is resolved on its
//! own task, so a client hanging up or a hot reload never cuts a dispatch
//! short. The task answers through a [`ResponseSink`], which can be used once.

use axum::body::Body;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Request, Response, StatusCode};
use http_body_util::LengthLimitError;
use lifecycle::LifecycleManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use worker_runtime::{Event, FetchEvent, FetchRequest, FetchResponse, ResponseType, Settled};

use crate::navigation::NavigationFlag;
use crate::network::NetworkClient;

/// Single-use response slot for one request
#[derive(Debug)]
pub struct ResponseSink {
    tx: oneshot::Sender<Response<Body>>,
}

impl ResponseSink {
    /// Create a sink and the receiving end the HTTP handler waits on
    pub fn channel() -> (Self, oneshot::Receiver<Response<Body>>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Deliver the response, consuming the sink
    pub fn send(self, response: Response<Body>) {
        if self.tx.send(response).is_err() {
            debug!("client went away before the response was ready");
        }
    }
}

/// Per-request state, owned by the task resolving it
#[derive(Debug)]
pub struct RequestContext {
    /// The buffered request
    pub request: FetchRequest,
    /// Whether the control channel flagged this request as a navigation
    pub is_navigate: bool,
    /// Where the response goes
    pub sink: ResponseSink,
}

/// Turns HTTP requests into fetch events and resolves them
#[derive(Clone)]
pub struct Dispatcher {
    lifecycle: Arc<LifecycleManager>,
    network: NetworkClient,
    navigation: Arc<NavigationFlag>,
    origin: String,
    respond_timeout: Duration,
}

impl Dispatcher {
    /// Create a dispatcher
    pub fn new(
        lifecycle: Arc<LifecycleManager>,
        network: NetworkClient,
        navigation: Arc<NavigationFlag>,
        origin: String,
        respond_timeout: Duration,
    ) -> Self {
        Self {
            lifecycle,
            network,
            navigation,
            origin,
            respond_timeout,
        }
    }

    /// Answer one HTTP request
    pub async fn handle(&self, request: Request<Body>) -> Response<Body> {
        if request.uri().path().contains("favicon") {
            return favicon();
        }
        let is_navigate = self.navigation.take();
        let request = match buffer_request(&self.origin, request).await {
            Ok(request) => request,
            Err(response) => return response,
        };
        debug!(
            method = %request.method,
            path = %request.path_and_query,
            navigate = is_navigate,
            "request received"
        );

        let (sink, rx) = ResponseSink::channel();
        let context = RequestContext {
            request,
            is_navigate,
            sink,
        };
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.run(context).await });

        rx.await.unwrap_or_else(|_| {
            warn!("request task ended without a response");
            plain(StatusCode::INTERNAL_SERVER_ERROR, "request task failed")
        })
    }

    /// Resolve a request and deliver exactly one response to its sink
    pub async fn run(&self, context: RequestContext) {
        let RequestContext {
            request,
            is_navigate,
            sink,
        } = context;
        let response = self.resolve(request, is_navigate).await;
        sink.send(response);
    }

    async fn resolve(&self, request: FetchRequest, is_navigate: bool) -> Response<Body> {
        if let Err(err) = self.lifecycle.prepare_request(is_navigate).await {
            warn!(path = %request.path_and_query, error = %err, "worker not ready, using network");
            return self.network.forward(request).await;
        }
        let Some(current) = self.lifecycle.current() else {
            debug!(path = %request.path_and_query, "no active worker");
            return self.network.forward(request).await;
        };

        let (event, pending) = FetchEvent::new(request.clone(), is_navigate);
        if let Err(err) = current.instance.dispatch_event(&Event::Fetch(event)) {
            warn!(version = %current.version, error = %err, "fetch handler failed, using network");
            return self.network.forward(request).await;
        }

        match pending.settle(self.respond_timeout).await {
            Settled::Resolved(response) => {
                info!(
                    version = %current.version,
                    path = %request.path_and_query,
                    status = response.status,
                    "served by worker"
                );
                into_http(response)
            }
            Settled::Unclaimed => self.network.forward(request).await,
            other => {
                warn!(
                    version = %current.version,
                    path = %request.path_and_query,
                    outcome = other.label(),
                    "worker did not respond, using network"
                );
                self.network.forward(request).await
            }
        }
    }
}

/// Largest request body buffered for the worker, matching axum's default limit
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Read the whole request body and build the worker-facing request
pub async fn buffer_request(
    origin: &str,
    request: Request<Body>,
) -> Result<FetchRequest, Response<Body>> {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|err| {
            if exceeds_limit(&err) {
                warn!(limit = MAX_BODY_BYTES, "request body too large");
                return plain(StatusCode::PAYLOAD_TOO_LARGE, "request body too large");
            }
            warn!(error = %err, "failed to read request body");
            plain(StatusCode::BAD_REQUEST, "unreadable request body")
        })?;
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    Ok(FetchRequest::new(parts.method, origin, path_and_query)
        .with_headers(parts.headers)
        .with_body(body))
}

fn exceeds_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(current) = source {
        if current.is::<LengthLimitError>() {
            return true;
        }
        source = current.source();
    }
    false
}

/// Convert a worker response into an HTTP response
pub fn into_http(response: FetchResponse) -> Response<Body> {
    if response.response_type == ResponseType::Error {
        return plain(StatusCode::BAD_GATEWAY, "worker responded with a network error");
    }
    let Ok(status) = StatusCode::from_u16(response.status) else {
        warn!(status = response.status, "worker produced an invalid status");
        return plain(StatusCode::INTERNAL_SERVER_ERROR, "invalid worker response status");
    };
    let mut http = Response::new(Body::from(response.body));
    *http.status_mut() = status;
    *http.headers_mut() = response.headers;
    http
}

/// Empty answer for favicon requests
pub fn favicon() -> Response<Body> {
    Response::new(Body::empty())
}

fn plain(status: StatusCode, message: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(message));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}

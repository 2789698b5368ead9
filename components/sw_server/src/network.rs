//! Network fallback: proxying requests to the upstream origin

use async_trait::async_trait;
use axum::body::Body;
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE, HOST};
use http::{Request, Response, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, error};
use worker_runtime::{Fetch, FetchError, FetchRequest, FetchResponse, ResponseType};

use crate::config::Config;

type HttpClient = Client<HttpConnector, Full<Bytes>>;

/// HTTP client bound to the upstream origin
#[derive(Clone)]
pub struct NetworkClient {
    client: HttpClient,
    base: String,
    host: HeaderValue,
}

impl NetworkClient {
    /// Create a client for the configured upstream
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        Self::for_upstream(&config.upstream_base, &config.upstream_host)
    }

    /// Create a client for `base`, sending `host` as the `Host` header
    pub fn for_upstream(base: &str, host: &str) -> Result<Self, FetchError> {
        let host = HeaderValue::from_str(host)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", host, e)))?;
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_string(),
            host,
        })
    }

    /// Upstream base URL
    pub fn base(&self) -> &str {
        &self.base
    }

    fn upstream_request(&self, request: &FetchRequest) -> Result<Request<Full<Bytes>>, FetchError> {
        let target = format!("{}{}", self.base, request.path_and_query);
        let uri: Uri = target
            .parse()
            .map_err(|e: http::uri::InvalidUri| FetchError::InvalidUrl(format!("{}: {}", target, e)))?;

        let mut builder = Request::builder().method(request.method.clone()).uri(uri);
        if let Some(headers) = builder.headers_mut() {
            for (name, value) in &request.headers {
                if *name != HOST {
                    headers.append(name, value.clone());
                }
            }
            headers.insert(HOST, self.host.clone());
        }
        builder
            .body(Full::new(request.body.clone()))
            .map_err(|e| FetchError::InvalidUrl(e.to_string()))
    }

    async fn send(&self, request: &FetchRequest) -> Result<Response<hyper::body::Incoming>, FetchError> {
        let upstream = self.upstream_request(request)?;
        self.client
            .request(upstream)
            .await
            .map_err(|e| FetchError::Upstream(e.to_string()))
    }

    /// Forward `request` upstream and stream the answer back.
    ///
    /// Never fails: an unreachable upstream becomes a 502.
    pub async fn forward(&self, request: FetchRequest) -> Response<Body> {
        debug!(method = %request.method, path = %request.path_and_query, "forwarding to network");
        match self.send(&request).await {
            Ok(response) => response.map(Body::new),
            Err(err) => {
                error!(path = %request.path_and_query, error = %err, "network fallback failed");
                bad_gateway(&err)
            }
        }
    }
}

#[async_trait]
impl Fetch for NetworkClient {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let response = self.send(&request).await?;
        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| FetchError::Body(e.to_string()))?
            .to_bytes();

        let mut fetched = FetchResponse::new(parts.status.as_u16(), body).with_type(ResponseType::Basic);
        fetched.headers = parts.headers;
        Ok(fetched)
    }
}

impl std::fmt::Debug for NetworkClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkClient")
            .field("base", &self.base)
            .field("host", &self.host)
            .finish()
    }
}

fn bad_gateway(err: &FetchError) -> Response<Body> {
    let mut response = Response::new(Body::from(format!("bad gateway: {}", err)));
    *response.status_mut() = StatusCode::BAD_GATEWAY;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}

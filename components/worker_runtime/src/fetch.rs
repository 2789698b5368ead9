//! Request/response values and the fetch capability
//!
//! Bodies are fully buffered: a request body may be read by the worker and
//! then forwarded to the network by the fallback path, so both sides need
//! their own cheap handle on the same bytes.

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, Method};

use crate::error::FetchError;

/// Request mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// Top-level page load, flagged out of band by the control channel
    Navigate,
    /// Any other request issued by the page
    SameOrigin,
}

/// A buffered request as seen by a worker
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Absolute URL as the page addressed it (origin + path)
    pub url: String,
    /// Path and query, used to address the upstream
    pub path_and_query: String,
    /// HTTP method
    pub method: Method,
    /// Request headers
    pub headers: HeaderMap,
    /// Request body
    pub body: Bytes,
    /// Request mode
    pub mode: RequestMode,
}

impl FetchRequest {
    /// Create a new request against `origin`
    pub fn new(method: Method, origin: &str, path_and_query: &str) -> Self {
        let path_and_query = if path_and_query.starts_with('/') {
            path_and_query.to_string()
        } else {
            format!("/{}", path_and_query)
        };
        Self {
            url: format!("{}{}", origin.trim_end_matches('/'), path_and_query),
            path_and_query,
            method,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            mode: RequestMode::SameOrigin,
        }
    }

    /// Create a GET request
    pub fn get(origin: &str, path_and_query: &str) -> Self {
        Self::new(Method::GET, origin, path_and_query)
    }

    /// Mark the request as a navigation
    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    /// Attach headers
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Attach a body
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Path component without the query string
    pub fn path(&self) -> &str {
        self.path_and_query
            .split_once('?')
            .map(|(path, _)| path)
            .unwrap_or(&self.path_and_query)
    }

    /// Whether this request is a navigation
    pub fn is_navigate(&self) -> bool {
        self.mode == RequestMode::Navigate
    }
}

/// Response types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    /// Came back from the network
    Basic,
    /// Constructed by a worker
    Default,
    /// Network error placeholder
    Error,
}

/// A buffered response
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Response status code
    pub status: u16,
    /// Status text
    pub status_text: String,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: Bytes,
    /// Response type
    pub response_type: ResponseType,
}

impl FetchResponse {
    /// Create a new response
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            status_text: status_text(status).to_string(),
            headers: HeaderMap::new(),
            body: body.into(),
            response_type: ResponseType::Default,
        }
    }

    /// Create a `text/plain` response
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        let body: String = body.into();
        Self::new(status, body).with_header(CONTENT_TYPE, HeaderValue::from_static("text/plain"))
    }

    /// Create an error response
    pub fn error() -> Self {
        Self {
            status: 0,
            status_text: String::new(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            response_type: ResponseType::Error,
        }
    }

    /// Add a header
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Set the response type
    pub fn with_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    /// Check if the response is OK (status 200-299)
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Get status text for common status codes
pub fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "",
    }
}

/// The `fetch` capability handed to workers
///
/// Relative requests are resolved against the configured upstream, the same
/// place network fallback sends unhandled requests.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Perform the request and buffer the whole response
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError>;
}

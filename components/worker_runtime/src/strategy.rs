//! Fetch strategies for declarative worker routes

use http::Method;
use tracing::{debug, warn};

use crate::cache::Cache;
use crate::fetch::{FetchRequest, FetchResponse};
use crate::worker::WorkerScope;

/// How a matched route answers a request it claims.
///
/// Pass-through routes carry no strategy at all.
#[derive(Debug, Clone)]
pub enum Strategy {
    /// Answer with a fixed response
    Static(FetchResponse),
    /// Answer from the cache only; a miss is a 504
    CacheOnly {
        /// Cache name
        cache: String,
    },
    /// Cache, then network (storing successful responses)
    CacheFirst {
        /// Cache name
        cache: String,
    },
    /// Network (storing successful responses), then cache
    NetworkFirst {
        /// Cache name
        cache: String,
    },
}

impl Strategy {
    /// Whether this strategy answers `request` itself.
    ///
    /// Cache strategies only apply to GET; anything else falls through.
    pub fn claims(&self, request: &FetchRequest) -> bool {
        match self {
            Strategy::Static(_) => true,
            Strategy::CacheOnly { .. }
            | Strategy::CacheFirst { .. }
            | Strategy::NetworkFirst { .. } => request.method == Method::GET,
        }
    }

    /// Produce the response for a claimed request
    pub async fn respond(&self, scope: &WorkerScope, request: FetchRequest) -> FetchResponse {
        match self {
            Strategy::Static(response) => response.clone(),
            Strategy::CacheOnly { cache } => scope
                .caches
                .open(cache)
                .match_request(&request)
                .unwrap_or_else(|| offline("no cached response")),
            Strategy::CacheFirst { cache } => {
                let cache = scope.caches.open(cache);
                if let Some(hit) = cache.match_request(&request) {
                    debug!(target: "sw", url = %request.url, cache = cache.name(), "cache hit");
                    return hit;
                }
                match scope.fetch.fetch(request.clone()).await {
                    Ok(response) => {
                        store(&cache, &request, &response);
                        response
                    }
                    Err(err) => offline(&err.to_string()),
                }
            }
            Strategy::NetworkFirst { cache } => {
                let cache = scope.caches.open(cache);
                match scope.fetch.fetch(request.clone()).await {
                    Ok(response) => {
                        store(&cache, &request, &response);
                        response
                    }
                    Err(err) => {
                        debug!(target: "sw", url = %request.url, error = %err, "network failed, trying cache");
                        cache
                            .match_request(&request)
                            .unwrap_or_else(|| offline(&err.to_string()))
                    }
                }
            }
        }
    }
}

fn store(cache: &Cache, request: &FetchRequest, response: &FetchResponse) {
    if !response.ok() {
        return;
    }
    if let Err(err) = cache.put(request, response.clone()) {
        warn!(target: "sw", error = %err, "cache put failed");
    }
}

fn offline(reason: &str) -> FetchResponse {
    FetchResponse::text(504, format!("offline: {}", reason))
}

//! End-to-end proxy flow over real sockets
//!
//! Upstream -> proxy -> declarative worker -> client

use http::StatusCode;
use integration_tests::{Proxy, Upstream};

/// Test: with no worker the proxy is a transparent reverse proxy
#[tokio::test]
async fn test_passthrough_without_worker() {
    let upstream = Upstream::start().await;
    let proxy = Proxy::start(upstream.addr, &[]).await;

    let (status, body) = proxy.get("/index.html?x=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, format!("GET /index.html?x=1 #1 host={}", upstream.addr));
}

/// Test: precached assets are served from cache without touching upstream
#[tokio::test]
async fn test_precache_then_cache_first() {
    let upstream = Upstream::start().await;
    let proxy = Proxy::start(upstream.addr, &[]).await;
    proxy
        .state
        .lifecycle
        .reload(
            r#"{"version": "v1",
                "install": {"precache": {"cache": "static-v1", "urls": ["/app.js"]}},
                "routes": [{"match": "\\.js$", "strategy": "cache_first", "cache": "static-v1"}]}"#,
        )
        .unwrap();

    let expected = format!("GET /app.js #1 host={}", upstream.addr);
    assert_eq!(proxy.navigate("/app.js").await, (StatusCode::OK, expected.clone()));
    assert_eq!(proxy.get("/app.js").await.1, expected);
    assert_eq!(upstream.hits(), 1);
}

/// Test: a reloaded worker only takes over on the next navigation
#[tokio::test]
async fn test_new_version_waits_for_navigation() {
    let upstream = Upstream::start().await;
    let proxy = Proxy::start(upstream.addr, &[]).await;
    let worker = |version: &str| {
        format!(
            r#"{{"version": "{v}", "routes": [
                {{"match": "^/version$", "strategy": "static", "response": {{"body": "{v}"}}}}
            ]}}"#,
            v = version
        )
    };

    proxy.state.lifecycle.reload(&worker("v1")).unwrap();
    assert_eq!(proxy.get("/version").await.1, "v1");

    proxy.state.lifecycle.reload(&worker("v2")).unwrap();
    proxy.state.lifecycle.await_install().await.unwrap();
    assert_eq!(proxy.get("/version").await.1, "v1");
    assert_eq!(proxy.navigate("/version").await.1, "v2");
    assert_eq!(proxy.get("/version").await.1, "v2");
    assert_eq!(upstream.hits(), 0);
}

/// Test: activation prunes caches the new version does not keep
#[tokio::test]
async fn test_activation_deletes_stale_caches() {
    let upstream = Upstream::start().await;
    let proxy = Proxy::start(upstream.addr, &[]).await;
    proxy
        .state
        .lifecycle
        .reload(
            r#"{"version": "v1",
                "install": {"precache": {"cache": "static-v1", "urls": ["/old.js"]}},
                "routes": [{"match": "\\.js$", "strategy": "cache_only", "cache": "static-v1"}]}"#,
        )
        .unwrap();
    assert_eq!(proxy.navigate("/old.js").await.0, StatusCode::OK);

    proxy
        .state
        .lifecycle
        .reload(
            r#"{"version": "v2",
                "activate": {"keep_caches": ["static-v2"]},
                "routes": [{"match": "\\.js$", "strategy": "cache_only", "cache": "static-v1"}]}"#,
        )
        .unwrap();
    let (status, body) = proxy.navigate("/old.js").await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert!(body.starts_with("offline"));
}

/// Test: a version whose install fails never replaces the running one
#[tokio::test]
async fn test_failed_install_keeps_current_worker() {
    let upstream = Upstream::start().await;
    let proxy = Proxy::start(upstream.addr, &[]).await;
    proxy
        .state
        .lifecycle
        .reload(r#"{"version": "v1", "routes": [{"match": "^/$", "strategy": "static", "response": {"body": "v1"}}]}"#)
        .unwrap();
    assert_eq!(proxy.navigate("/").await.1, "v1");

    proxy
        .state
        .lifecycle
        .reload(r#"{"version": "v2", "install": {"fail": true}}"#)
        .unwrap();
    assert!(proxy.state.lifecycle.await_install().await.is_err());
    assert_eq!(proxy.navigate("/").await.1, "v1");
    assert_eq!(proxy.state.lifecycle.current().unwrap().version, "v1");
}

/// Test: a navigation that was waiting on an install that fails goes to upstream
#[tokio::test]
async fn test_navigation_during_failing_install_reaches_upstream() {
    let upstream = Upstream::start().await;
    let proxy = Proxy::start(upstream.addr, &[]).await;
    proxy
        .state
        .lifecycle
        .reload(r#"{"version": "v1", "install": {"fail": true}}"#)
        .unwrap();

    assert_eq!(
        proxy.navigate("/").await,
        (StatusCode::OK, format!("GET / #1 host={}", upstream.addr))
    );
    assert!(proxy.state.lifecycle.current().is_none());
}

/// Test: routes that do not claim a request fall through to upstream
#[tokio::test]
async fn test_unclaimed_request_reaches_upstream() {
    let upstream = Upstream::start().await;
    let proxy = Proxy::start(upstream.addr, &["--respond-timeout-ms", "500"]).await;
    proxy
        .state
        .lifecycle
        .reload(r#"{"version": "v1", "routes": [{"match": "^/api/", "strategy": "network"}]}"#)
        .unwrap();

    assert_eq!(
        proxy.get("/api/items").await.1,
        format!("GET /api/items #1 host={}", upstream.addr)
    );
    assert_eq!(
        proxy.get("/about").await.1,
        format!("GET /about #2 host={}", upstream.addr)
    );
}

/// Test: favicon requests never reach the worker or upstream
#[tokio::test]
async fn test_favicon_is_answered_locally() {
    let upstream = Upstream::start().await;
    let proxy = Proxy::start(upstream.addr, &[]).await;

    assert_eq!(proxy.get("/favicon.ico").await, (StatusCode::OK, String::new()));
    assert_eq!(upstream.hits(), 0);
}

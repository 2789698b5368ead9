//! Hot reload of the worker file while the proxy serves traffic

use integration_tests::{Proxy, Upstream};
use std::path::Path;
use std::time::Duration;

fn write_worker(path: &Path, version: &str) {
    let source = format!(
        r#"{{"version": "{v}", "routes": [
            {{"match": "^/$", "strategy": "static", "response": {{"body": "{v}"}}}}
        ]}}"#,
        v = version
    );
    std::fs::write(path, source).unwrap();
}

/// Test: editing the worker file installs the new version for the next navigation
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_edit_is_picked_up_on_next_navigation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sw.json");
    write_worker(&path, "v1");

    let upstream = Upstream::start().await;
    let proxy = Proxy::start(upstream.addr, &[]).await;
    sw_server::load_worker(&proxy.state.lifecycle, &path).unwrap();
    let _watcher = sw_server::watch(&path, proxy.state.lifecycle.clone()).unwrap();
    assert_eq!(proxy.navigate("/").await.1, "v1");

    tokio::time::sleep(Duration::from_millis(100)).await;
    write_worker(&path, "v2");

    let mut seen = String::new();
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        seen = proxy.navigate("/").await.1;
        if seen == "v2" {
            break;
        }
    }
    assert_eq!(seen, "v2");
}

/// Test: a broken edit leaves the last good version serving
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_broken_edit_keeps_serving() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sw.json");
    write_worker(&path, "v1");

    let upstream = Upstream::start().await;
    let proxy = Proxy::start(upstream.addr, &[]).await;
    sw_server::load_worker(&proxy.state.lifecycle, &path).unwrap();
    let _watcher = sw_server::watch(&path, proxy.state.lifecycle.clone()).unwrap();
    assert_eq!(proxy.navigate("/").await.1, "v1");

    std::fs::write(&path, "{ not json").unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(proxy.navigate("/").await.1, "v1");
    assert!(proxy.state.lifecycle.next_slot().is_none());
}

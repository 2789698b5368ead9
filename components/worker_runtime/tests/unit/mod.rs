use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use worker_runtime::{
    CacheStorage, Event, ExtendableEvent, Fetch, FetchError, FetchEvent, FetchRequest,
    FetchResponse, MessageEvent, Messenger, ResolutionPolicy, ScriptRuntime, Settled, Worker,
    WorkerRuntime, WorkerScope,
};

const ORIGIN: &str = "http://localhost:8080";
const LIMIT: Duration = Duration::from_secs(2);

/// Upstream stub answering from a fixed table, counting every call
struct TableFetch {
    pages: HashMap<String, (u16, String)>,
    calls: AtomicUsize,
}

impl TableFetch {
    fn new(pages: &[(&str, u16, &str)]) -> Arc<Self> {
        Arc::new(Self {
            pages: pages
                .iter()
                .map(|(path, status, body)| (path.to_string(), (*status, body.to_string())))
                .collect(),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetch for TableFetch {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.pages.get(request.path()) {
            Some((status, body)) => Ok(FetchResponse::text(*status, body.clone())),
            None => Err(FetchError::Upstream(format!("no route to {}", request.path()))),
        }
    }
}

struct Fixture {
    runtime: ScriptRuntime,
    caches: Arc<CacheStorage>,
    messenger: Arc<Messenger>,
    fetch: Arc<TableFetch>,
}

fn fixture(pages: &[(&str, u16, &str)]) -> Fixture {
    let caches = Arc::new(CacheStorage::new());
    let messenger = Arc::new(Messenger::new());
    let fetch = TableFetch::new(pages);
    let scope = WorkerScope {
        origin: ORIGIN.to_string(),
        caches: caches.clone(),
        fetch: fetch.clone(),
        messenger: messenger.clone(),
    };
    Fixture {
        runtime: ScriptRuntime::new(scope),
        caches,
        messenger,
        fetch,
    }
}

async fn install(worker: &dyn Worker) -> Settled<()> {
    let (event, pending) = ExtendableEvent::new();
    worker
        .dispatch_event(&Event::Install(event))
        .expect("install dispatch should not fail");
    pending.settle(LIMIT).await
}

async fn activate(worker: &dyn Worker) -> Settled<()> {
    let (event, pending) = ExtendableEvent::new();
    worker
        .dispatch_event(&Event::Activate(event))
        .expect("activate dispatch should not fail");
    pending.settle(LIMIT).await
}

async fn fetch(worker: &dyn Worker, path: &str, navigate: bool) -> Settled<FetchResponse> {
    let (event, pending) = FetchEvent::new(FetchRequest::get(ORIGIN, path), navigate);
    worker
        .dispatch_event(&Event::Fetch(event))
        .expect("fetch dispatch should not fail");
    pending.settle(LIMIT).await
}

#[cfg(test)]
mod install_tests {
    use super::*;

    #[tokio::test]
    async fn test_precache_fills_named_cache() {
        let fx = fixture(&[("/", 200, "index"), ("/app.js", 200, "js")]);
        let worker = fx
            .runtime
            .build(
                r#"{"version": "v1",
                    "install": {"precache": {"cache": "static-v1", "urls": ["/", "/app.js"]}}}"#,
            )
            .unwrap();

        assert!(matches!(install(worker.as_ref()).await, Settled::Resolved(())));
        let cache = fx.caches.open("static-v1");
        assert_eq!(cache.len(), 2);
        let hit = cache.match_url("http://localhost:8080/app.js").unwrap();
        assert_eq!(&hit.body[..], b"js");
    }

    #[tokio::test]
    async fn test_precache_rejects_on_upstream_error_status() {
        let fx = fixture(&[("/", 200, "index"), ("/missing", 404, "nope")]);
        let worker = fx
            .runtime
            .build(
                r#"{"version": "v1",
                    "install": {"precache": {"cache": "c", "urls": ["/", "/missing"]}}}"#,
            )
            .unwrap();

        match install(worker.as_ref()).await {
            Settled::Rejected(reason) => assert!(reason.contains("/missing")),
            other => panic!("expected rejection, got {}", other.label()),
        }
    }

    #[tokio::test]
    async fn test_declared_failure_rejects_install() {
        let fx = fixture(&[]);
        let worker = fx
            .runtime
            .build(r#"{"version": "v1", "install": {"fail": true}}"#)
            .unwrap();
        assert!(matches!(install(worker.as_ref()).await, Settled::Rejected(_)));
    }

    #[tokio::test]
    async fn test_plain_install_is_unclaimed() {
        let fx = fixture(&[]);
        let worker = fx.runtime.build(r#"{"version": "v1"}"#).unwrap();
        assert!(matches!(install(worker.as_ref()).await, Settled::Unclaimed));
    }
}

#[cfg(test)]
mod activate_tests {
    use super::*;

    #[tokio::test]
    async fn test_keep_caches_prunes_the_rest() {
        let fx = fixture(&[]);
        fx.caches.open("static-v1");
        fx.caches.open("static-v2");
        fx.caches.open("pages");
        let worker = fx
            .runtime
            .build(r#"{"version": "v2", "activate": {"keep_caches": ["static-v2", "pages"]}}"#)
            .unwrap();

        assert!(matches!(activate(worker.as_ref()).await, Settled::Resolved(())));
        assert_eq!(fx.caches.keys(), vec!["pages".to_string(), "static-v2".to_string()]);
    }

    #[tokio::test]
    async fn test_activate_without_step_leaves_caches() {
        let fx = fixture(&[]);
        fx.caches.open("old");
        let worker = fx.runtime.build(r#"{"version": "v2"}"#).unwrap();
        assert!(matches!(activate(worker.as_ref()).await, Settled::Unclaimed));
        assert!(fx.caches.has("old"));
    }
}

#[cfg(test)]
mod fetch_tests {
    use super::*;

    const ROUTES: &str = r#"{
        "version": "v1",
        "routes": [
            {"match": "^/api/", "strategy": "network"},
            {"match": "^/hello$", "strategy": "static",
             "response": {"status": 200, "headers": {"x-served-by": "sw"}, "body": "hi"}},
            {"match": "\\.js$", "strategy": "cache_first", "cache": "assets"},
            {"match": "^/offline$", "strategy": "cache_only", "cache": "assets"}
        ]
    }"#;

    #[tokio::test]
    async fn test_static_route() {
        let fx = fixture(&[]);
        let worker = fx.runtime.build(ROUTES).unwrap();
        match fetch(worker.as_ref(), "/hello", false).await {
            Settled::Resolved(resp) => {
                assert_eq!(resp.status, 200);
                assert_eq!(resp.headers.get("x-served-by").unwrap(), "sw");
                assert_eq!(&resp.body[..], b"hi");
            }
            other => panic!("expected response, got {}", other.label()),
        }
    }

    #[tokio::test]
    async fn test_network_route_falls_through() {
        let fx = fixture(&[]);
        let worker = fx.runtime.build(ROUTES).unwrap();
        assert!(matches!(fetch(worker.as_ref(), "/api/users", false).await, Settled::Unclaimed));
        assert!(matches!(fetch(worker.as_ref(), "/unrouted", false).await, Settled::Unclaimed));
        assert_eq!(fx.fetch.calls(), 0);
    }

    #[tokio::test]
    async fn test_network_route_shadows_later_routes() {
        let fx = fixture(&[]);
        let worker = fx
            .runtime
            .build(
                r#"{"version": "v1", "routes": [
                    {"match": "^/api/", "strategy": "network"},
                    {"match": "^/api/", "strategy": "static", "response": {"body": "shadowed"}}
                ]}"#,
            )
            .unwrap();
        assert!(matches!(fetch(worker.as_ref(), "/api/x", false).await, Settled::Unclaimed));
        assert_eq!(fx.fetch.calls(), 0);
    }

    #[tokio::test]
    async fn test_cache_first_route_goes_to_network_once() {
        let fx = fixture(&[("/app.js", 200, "console.log(1)")]);
        let worker = fx.runtime.build(ROUTES).unwrap();

        for _ in 0..3 {
            match fetch(worker.as_ref(), "/app.js?v=1", false).await {
                Settled::Resolved(resp) => assert_eq!(&resp.body[..], b"console.log(1)"),
                other => panic!("expected response, got {}", other.label()),
            }
        }
        assert_eq!(fx.fetch.calls(), 1);
    }

    #[tokio::test]
    async fn test_cache_only_miss() {
        let fx = fixture(&[]);
        let worker = fx.runtime.build(ROUTES).unwrap();
        match fetch(worker.as_ref(), "/offline", false).await {
            Settled::Resolved(resp) => assert_eq!(resp.status, 504),
            other => panic!("expected response, got {}", other.label()),
        }
    }

    #[tokio::test]
    async fn test_post_is_not_claimed_by_cache_route() {
        let fx = fixture(&[]);
        let worker = fx.runtime.build(ROUTES).unwrap();
        let request = FetchRequest::new(http::Method::POST, ORIGIN, "/app.js");
        let (event, pending) = FetchEvent::new(request, false);
        worker.dispatch_event(&Event::Fetch(event)).unwrap();
        assert_eq!(pending.policy(), ResolutionPolicy::DefaultSuccess);
    }

    #[tokio::test]
    async fn test_versions_share_caches_not_state() {
        let fx = fixture(&[("/app.js", 200, "v1 body")]);
        let v1 = fx.runtime.build(ROUTES).unwrap();
        let _ = fetch(v1.as_ref(), "/app.js", false).await;

        let v2 = fx
            .runtime
            .build(r#"{"version": "v2", "routes": [
                {"match": "\\.js$", "strategy": "cache_only", "cache": "assets"}
            ]}"#)
            .unwrap();
        match fetch(v2.as_ref(), "/app.js", false).await {
            Settled::Resolved(resp) => assert_eq!(&resp.body[..], b"v1 body"),
            other => panic!("expected cached response, got {}", other.label()),
        }
        assert_eq!(v1.version(), "v1");
        assert_eq!(v2.version(), "v2");
    }
}

#[cfg(test)]
mod message_tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_broadcasts_to_connections() {
        let fx = fixture(&[]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        fx.messenger.add(tx);
        let worker = fx.runtime.build(r#"{"version": "v7"}"#).unwrap();

        let (event, pending) = MessageEvent::new(json!({"ping": 1}));
        worker.dispatch_event(&Event::Message(event)).unwrap();
        assert!(matches!(pending.settle(LIMIT).await, Settled::Unclaimed));

        let posted: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(posted, json!({"type": "message", "version": "v7", "data": {"ping": 1}}));
    }

    #[tokio::test]
    async fn test_ignore_posts_nothing() {
        let fx = fixture(&[]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        fx.messenger.add(tx);
        let worker = fx
            .runtime
            .build(r#"{"version": "v1", "messages": "ignore"}"#)
            .unwrap();

        let (event, _pending) = MessageEvent::new(json!("hello"));
        worker.dispatch_event(&Event::Message(event)).unwrap();
        assert!(rx.try_recv().is_err());
    }
}

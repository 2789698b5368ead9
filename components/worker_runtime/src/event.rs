//! Dispatchable events and their resolution capabilities
//!
//! Every event is created together with a [`Pending`] handle owned by the
//! dispatcher. The worker sees the event; the dispatcher keeps the handle.
//!
//! Resolution follows one rule for all event types: a worker that does not
//! claim the event during synchronous dispatch (`wait_until` for lifecycle and
//! message events, `respond_with` for fetch) leaves it to settle immediately
//! under [`ResolutionPolicy::DefaultSuccess`]. Claimed events settle exactly
//! once, through the first call on their [`Resolver`]; later calls are ignored.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::fetch::{FetchRequest, FetchResponse, RequestMode};

type Settlement<T> = Result<T, String>;

/// Single-assignment resolution capability.
///
/// Clones share one slot. The first `resolve` or `reject` wins and returns
/// `true`; every later call returns `false` and has no effect. Dropping every
/// clone without settling is observed by the dispatcher as
/// [`Settled::Abandoned`].
pub struct Resolver<T> {
    slot: Arc<Mutex<Option<oneshot::Sender<Settlement<T>>>>>,
}

/// Resolver for a fetch event's response
pub type Responder = Resolver<FetchResponse>;

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Resolver<T> {
    fn channel() -> (Self, oneshot::Receiver<Settlement<T>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                slot: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Settle successfully. Returns `false` if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Settle with a failure. Returns `false` if already settled.
    pub fn reject(&self, reason: impl Into<String>) -> bool {
        self.settle(Err(reason.into()))
    }

    /// Whether a resolve or reject has already happened
    pub fn is_settled(&self) -> bool {
        self.slot.lock().is_none()
    }

    fn settle(&self, outcome: Settlement<T>) -> bool {
        let Some(tx) = self.slot.lock().take() else {
            return false;
        };
        // The dispatcher may have stopped listening (timeout); settling still counts.
        let _ = tx.send(outcome);
        true
    }
}

impl<T> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// How an event settles once synchronous dispatch has returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionPolicy {
    /// The worker never claimed the event; it counts as settled right away.
    /// For lifecycle events that means success, for fetch it means fall through.
    DefaultSuccess,
    /// The worker claimed the event and will settle it through its resolver.
    Deferred,
}

/// Outcome of waiting on a [`Pending`] handle
#[derive(Debug)]
pub enum Settled<T> {
    /// Not claimed during dispatch
    Unclaimed,
    /// Claimed and resolved
    Resolved(T),
    /// Claimed and rejected
    Rejected(String),
    /// Claimed, then every resolver was dropped unsettled
    Abandoned,
    /// Claimed, but not settled within the limit
    TimedOut(Duration),
}

impl<T> Settled<T> {
    /// Short name for logging
    pub fn label(&self) -> &'static str {
        match self {
            Settled::Unclaimed => "unclaimed",
            Settled::Resolved(_) => "resolved",
            Settled::Rejected(_) => "rejected",
            Settled::Abandoned => "abandoned",
            Settled::TimedOut(_) => "timed out",
        }
    }
}

/// Dispatcher-side handle on an event's eventual outcome
pub struct Pending<T> {
    claimed: Arc<AtomicBool>,
    rx: oneshot::Receiver<Settlement<T>>,
}

impl<T> Pending<T> {
    /// Policy implied by whether the worker claimed the event so far.
    ///
    /// Call right after synchronous dispatch returns.
    pub fn policy(&self) -> ResolutionPolicy {
        if self.claimed.load(Ordering::SeqCst) {
            ResolutionPolicy::Deferred
        } else {
            ResolutionPolicy::DefaultSuccess
        }
    }

    /// Wait for the event to settle, bounded by `limit` when deferred.
    pub async fn settle(self, limit: Duration) -> Settled<T> {
        if self.policy() == ResolutionPolicy::DefaultSuccess {
            return Settled::Unclaimed;
        }
        match tokio::time::timeout(limit, self.rx).await {
            Ok(Ok(Ok(value))) => Settled::Resolved(value),
            Ok(Ok(Err(reason))) => Settled::Rejected(reason),
            Ok(Err(_)) => Settled::Abandoned,
            Err(_) => Settled::TimedOut(limit),
        }
    }
}

impl<T> fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending")
            .field("policy", &self.policy())
            .finish()
    }
}

fn claimable<T>() -> (Arc<AtomicBool>, Resolver<T>, Pending<T>) {
    let claimed = Arc::new(AtomicBool::new(false));
    let (resolver, rx) = Resolver::channel();
    let pending = Pending {
        claimed: Arc::clone(&claimed),
        rx,
    };
    (claimed, resolver, pending)
}

/// Install and activate events, and the base of message events
#[derive(Clone)]
pub struct ExtendableEvent {
    claimed: Arc<AtomicBool>,
    resolver: Resolver<()>,
}

impl ExtendableEvent {
    /// Create an event and the dispatcher's handle on it
    pub fn new() -> (Self, Pending<()>) {
        let (claimed, resolver, pending) = claimable();
        (Self { claimed, resolver }, pending)
    }

    /// Defer settlement; the returned resolver finishes the event
    pub fn wait_until(&self) -> Resolver<()> {
        self.claimed.store(true, Ordering::SeqCst);
        self.resolver.clone()
    }

    /// Whether `wait_until` has been called
    pub fn is_stopped(&self) -> bool {
        self.claimed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for ExtendableEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtendableEvent")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Fetch event that can be answered by a worker
#[derive(Clone)]
pub struct FetchEvent {
    inner: Arc<FetchInner>,
}

struct FetchInner {
    request: FetchRequest,
    claimed: Arc<AtomicBool>,
    responder: Responder,
}

impl FetchEvent {
    /// Create a fetch event for `request`
    pub fn new(request: FetchRequest, navigate: bool) -> (Self, Pending<FetchResponse>) {
        let request = if navigate {
            request.with_mode(RequestMode::Navigate)
        } else {
            request
        };
        let (claimed, responder, pending) = claimable();
        let inner = FetchInner {
            request,
            claimed,
            responder,
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            pending,
        )
    }

    /// The intercepted request
    pub fn request(&self) -> &FetchRequest {
        &self.inner.request
    }

    /// Whether this request was flagged as a navigation
    pub fn is_navigate(&self) -> bool {
        self.inner.request.is_navigate()
    }

    /// Claim the event; the response is supplied later through the responder
    pub fn respond_with(&self) -> Responder {
        self.inner.claimed.store(true, Ordering::SeqCst);
        self.inner.responder.clone()
    }

    /// Claim the event and answer it now.
    ///
    /// Returns `false` when a response was already supplied; the first one
    /// is kept.
    pub fn respond(&self, response: FetchResponse) -> bool {
        let accepted = self.respond_with().resolve(response);
        if !accepted {
            tracing::debug!(
                url = %self.inner.request.url,
                "fetch event already answered, ignoring response"
            );
        }
        accepted
    }

    /// Whether the worker claimed this event
    pub fn is_stopped(&self) -> bool {
        self.inner.claimed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for FetchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchEvent")
            .field("url", &self.inner.request.url)
            .field("navigate", &self.is_navigate())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Message relayed from the control channel into a worker
#[derive(Clone, Debug)]
pub struct MessageEvent {
    data: serde_json::Value,
    base: ExtendableEvent,
}

impl MessageEvent {
    /// Create a message event carrying `data`
    pub fn new(data: serde_json::Value) -> (Self, Pending<()>) {
        let (base, pending) = ExtendableEvent::new();
        (Self { data, base }, pending)
    }

    /// Application payload
    pub fn data(&self) -> &serde_json::Value {
        &self.data
    }

    /// Defer settlement of the message handler
    pub fn wait_until(&self) -> Resolver<()> {
        self.base.wait_until()
    }

    /// Whether `wait_until` has been called
    pub fn is_stopped(&self) -> bool {
        self.base.is_stopped()
    }
}

/// Event type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// `install`
    Install,
    /// `activate`
    Activate,
    /// `fetch`
    Fetch,
    /// `message`
    Message,
}

impl EventKind {
    /// DOM event type name
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Install => "install",
            EventKind::Activate => "activate",
            EventKind::Fetch => "fetch",
            EventKind::Message => "message",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Any event a worker can receive
#[derive(Debug, Clone)]
pub enum Event {
    /// Prepare the worker (precache and the like)
    Install(ExtendableEvent),
    /// The worker is about to take over
    Activate(ExtendableEvent),
    /// An intercepted HTTP request
    Fetch(FetchEvent),
    /// An application message
    Message(MessageEvent),
}

impl Event {
    /// Event type tag
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Install(_) => EventKind::Install,
            Event::Activate(_) => EventKind::Activate,
            Event::Fetch(_) => EventKind::Fetch,
            Event::Message(_) => EventKind::Message,
        }
    }

    /// Whether the worker claimed the event during dispatch
    pub fn is_stopped(&self) -> bool {
        match self {
            Event::Install(e) | Event::Activate(e) => e.is_stopped(),
            Event::Fetch(e) => e.is_stopped(),
            Event::Message(e) => e.is_stopped(),
        }
    }
}

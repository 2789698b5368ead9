//! Service worker runtime primitives.
//!
//! This crate holds everything a worker instance sees or produces:
//! - [`Event`] - the dispatchable events (install, activate, fetch, message)
//!   together with their first-wins resolution capabilities
//! - [`FetchRequest`] / [`FetchResponse`] - buffered request and response values
//! - [`CacheStorage`] - the process-wide, in-memory Cache API
//! - [`Messenger`] - broadcast registry for messages posted out of a worker
//! - [`Worker`] / [`WorkerRuntime`] - the seam between the lifecycle core and
//!   whatever actually executes worker source
//! - [`ScriptRuntime`] - the bundled runtime for declarative JSON workers
//!
//! # Example
//!
//! ```
//! use worker_runtime::{FetchEvent, FetchRequest, FetchResponse, Settled};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let request = FetchRequest::get("http://localhost:8080", "/hello");
//! let (event, pending) = FetchEvent::new(request, false);
//!
//! assert!(event.respond(FetchResponse::text(200, "first")));
//! assert!(!event.respond(FetchResponse::text(200, "second")));
//! drop(event);
//!
//! let outcome = pending.settle(Duration::from_secs(1)).await;
//! assert!(matches!(outcome, Settled::Resolved(ref r) if &r.body[..] == b"first"));
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod error;
pub mod event;
pub mod fetch;
pub mod messenger;
pub mod script;
pub mod strategy;
pub mod worker;

pub use cache::{Cache, CacheStorage};
pub use error::{CacheError, DispatchError, FetchError, LoadError, WorkerResult};
pub use event::{
    Event, EventKind, ExtendableEvent, FetchEvent, MessageEvent, Pending, ResolutionPolicy,
    Resolver, Responder, Settled,
};
pub use fetch::{Fetch, FetchRequest, FetchResponse, RequestMode, ResponseType};
pub use messenger::{ClientId, Messenger};
pub use script::{MessagePolicy, ScriptRuntime, ScriptWorker};
pub use worker::{Worker, WorkerHandle, WorkerRuntime, WorkerScope};

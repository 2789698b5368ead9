//! The seam between the lifecycle core and worker execution
//!
//! The core only ever builds workers through a [`WorkerRuntime`] and talks to
//! them through [`Worker::dispatch_event`]. Nothing else about a worker's
//! internals is visible to it, so the state machine can be driven by stub
//! workers in tests.

use std::sync::Arc;

use crate::cache::CacheStorage;
use crate::error::{DispatchError, WorkerResult};
use crate::event::Event;
use crate::fetch::Fetch;
use crate::messenger::Messenger;

/// A running worker instance
pub trait Worker: Send + Sync {
    /// Version declared by the worker's source
    fn version(&self) -> &str;

    /// Deliver an event.
    ///
    /// Runs synchronously. A handler that wants to settle the event later
    /// must claim it before returning (`wait_until` / `respond_with`) and may
    /// then finish from spawned work.
    fn dispatch_event(&self, event: &Event) -> Result<(), DispatchError>;
}

/// Shared handle to a worker instance
pub type WorkerHandle = Arc<dyn Worker>;

/// Builds worker instances from source text
pub trait WorkerRuntime: Send + Sync {
    /// Build an independent instance. Must not touch previously built ones.
    fn build(&self, source: &str) -> WorkerResult<WorkerHandle>;
}

/// Capabilities every worker instance is given
#[derive(Clone)]
pub struct WorkerScope {
    /// Origin the worker believes it is serving
    pub origin: String,
    /// Process-wide cache storage
    pub caches: Arc<CacheStorage>,
    /// Network access
    pub fetch: Arc<dyn Fetch>,
    /// Outbound message broadcast
    pub messenger: Arc<Messenger>,
}

impl std::fmt::Debug for WorkerScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerScope")
            .field("origin", &self.origin)
            .field("caches", &self.caches)
            .field("messenger", &self.messenger)
            .finish()
    }
}

//! Shared, settle-once lifecycle transitions
//!
//! A transition runs on its own spawned task, so it finishes even if every
//! caller awaiting it goes away. Callers hold a [`Transition`]: a cloneable
//! future that yields the same outcome to each of them.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::time::Duration;
use worker_runtime::{Event, ExtendableEvent, Settled, WorkerHandle};

use crate::error::{LifecycleError, LifecycleResult};
use crate::state::Phase;

/// Awaitable outcome of an install or activate transition
pub type Transition = Shared<BoxFuture<'static, LifecycleResult<()>>>;

/// Run `work` on its own task and share its outcome.
pub(crate) fn spawn_transition<F>(phase: Phase, version: String, work: F) -> Transition
where
    F: Future<Output = LifecycleResult<()>> + Send + 'static,
{
    let task = tokio::spawn(work);
    async move {
        match task.await {
            Ok(outcome) => outcome,
            Err(_) => Err(LifecycleError::Aborted { phase, version }),
        }
    }
    .boxed()
    .shared()
}

/// Dispatch an install or activate event and wait for it to settle.
///
/// An event the worker did not claim during dispatch succeeds immediately.
pub(crate) async fn run_extendable(
    worker: &WorkerHandle,
    phase: Phase,
    limit: Duration,
) -> LifecycleResult<()> {
    let version = worker.version().to_string();
    let (event, pending) = ExtendableEvent::new();
    let event = match phase {
        Phase::Install => Event::Install(event),
        Phase::Activate => Event::Activate(event),
    };
    worker
        .dispatch_event(&event)
        .map_err(|source| LifecycleError::Dispatch {
            phase,
            version: version.clone(),
            source,
        })?;
    // Our copy of the event holds a resolver; only the worker's should keep it alive.
    drop(event);

    match pending.settle(limit).await {
        Settled::Unclaimed | Settled::Resolved(()) => Ok(()),
        Settled::Rejected(reason) => Err(LifecycleError::Rejected {
            phase,
            version,
            reason,
        }),
        Settled::Abandoned => Err(LifecycleError::Abandoned { phase, version }),
        Settled::TimedOut(limit) => Err(LifecycleError::Timeout {
            phase,
            version,
            limit,
        }),
    }
}

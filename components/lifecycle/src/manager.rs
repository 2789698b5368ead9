//! The current/next worker slots and the transitions between them

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use worker_runtime::{LoadError, WorkerHandle, WorkerRuntime};

use crate::error::LifecycleResult;
use crate::state::{ActivateState, InstallState, Phase};
use crate::transition::{run_extendable, spawn_transition, Transition};

/// Time limits for claimed lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecyclePolicy {
    /// Limit for a claimed install event
    pub install_timeout: Duration,
    /// Limit for a claimed activate event
    pub activate_timeout: Duration,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            install_timeout: Duration::from_secs(30),
            activate_timeout: Duration::from_secs(30),
        }
    }
}

/// What a reload did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// Source matches the serving worker; nothing happened
    Unchanged,
    /// A new candidate was built and its install started
    Installing {
        /// Version declared by the candidate
        version: String,
    },
}

/// A worker instance together with its source and lifecycle state
#[derive(Clone)]
pub struct WorkerSlot {
    /// Monotonic id, unique per build
    pub generation: u64,
    /// Version declared by the worker
    pub version: String,
    /// Source text the instance was built from
    pub source: Arc<str>,
    /// The worker instance
    pub instance: WorkerHandle,
    /// Install progress
    pub install_state: InstallState,
    /// Activation progress
    pub activate_state: ActivateState,
}

impl std::fmt::Debug for WorkerSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerSlot")
            .field("generation", &self.generation)
            .field("version", &self.version)
            .field("install_state", &self.install_state)
            .field("activate_state", &self.activate_state)
            .finish()
    }
}

struct NextSlot {
    slot: WorkerSlot,
    install: Transition,
    activation: Option<Transition>,
}

/// Owner of the `current` and `next` worker slots.
///
/// `current` is empty until the first activation, and afterwards always
/// holds an installed, active worker. Swapping it is one atomic store, so a
/// request that loaded the old worker finishes against it.
///
/// `next` holds the most recent candidate. A reload replaces it without
/// cancelling transitions that already started; an install that finishes for
/// a replaced candidate is discarded. Activations are serialised: each one
/// waits for the previous to settle before dispatching.
pub struct LifecycleManager {
    runtime: Arc<dyn WorkerRuntime>,
    policy: LifecyclePolicy,
    current: Arc<ArcSwapOption<WorkerSlot>>,
    next: Arc<Mutex<Option<NextSlot>>>,
    last_activation: Mutex<Option<Transition>>,
    generation: AtomicU64,
}

impl LifecycleManager {
    /// Create a manager with empty slots
    pub fn new(runtime: Arc<dyn WorkerRuntime>, policy: LifecyclePolicy) -> Self {
        Self {
            runtime,
            policy,
            current: Arc::new(ArcSwapOption::empty()),
            next: Arc::new(Mutex::new(None)),
            last_activation: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Time limits in effect
    pub fn policy(&self) -> LifecyclePolicy {
        self.policy
    }

    /// The serving worker, if any has been activated
    pub fn current(&self) -> Option<Arc<WorkerSlot>> {
        self.current.load_full()
    }

    /// Snapshot of the pending candidate
    pub fn next_slot(&self) -> Option<WorkerSlot> {
        self.next.lock().as_ref().map(|next| next.slot.clone())
    }

    /// Build a candidate from `source` and start installing it.
    ///
    /// Source identical to the serving worker's is a no-op. A load error is
    /// returned as-is and leaves both slots untouched.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn reload(&self, source: &str) -> Result<ReloadOutcome, LoadError> {
        if let Some(current) = self.current.load().as_ref() {
            if &*current.source == source {
                info!(version = %current.version, "worker source unchanged, skipping reload");
                return Ok(ReloadOutcome::Unchanged);
            }
        }

        let instance = self.runtime.build(source).map_err(|err| {
            warn!(error = %err, "worker failed to load, keeping the serving worker");
            err
        })?;
        let slot = WorkerSlot {
            generation: self.generation.fetch_add(1, Ordering::SeqCst) + 1,
            version: instance.version().to_string(),
            source: Arc::from(source),
            instance,
            install_state: InstallState::Installing,
            activate_state: ActivateState::None,
        };
        let version = slot.version.clone();

        // The install task records its outcome under this lock, so the slot
        // must be in place before the task can get there.
        let mut next = self.next.lock();
        if let Some(replaced) = next.as_ref() {
            info!(
                replaced = %replaced.slot.version,
                version = %version,
                "replacing pending worker"
            );
        }
        let install = self.spawn_install(&slot);
        *next = Some(NextSlot {
            slot,
            install,
            activation: None,
        });
        info!(version = %version, "installing worker");
        Ok(ReloadOutcome::Installing { version })
    }

    fn spawn_install(&self, slot: &WorkerSlot) -> Transition {
        let next = Arc::clone(&self.next);
        let worker = Arc::clone(&slot.instance);
        let generation = slot.generation;
        let version = slot.version.clone();
        let limit = self.policy.install_timeout;

        spawn_transition(Phase::Install, version.clone(), async move {
            let outcome = run_extendable(&worker, Phase::Install, limit).await;
            let mut next = next.lock();
            let Some(candidate) = next.as_mut().filter(|n| n.slot.generation == generation) else {
                debug!(version = %version, "install settled for a replaced worker, discarding");
                return outcome;
            };
            match &outcome {
                Ok(()) => {
                    candidate.slot.install_state = InstallState::Installed;
                    candidate.slot.activate_state = ActivateState::Waiting;
                    info!(version = %version, "worker installed, waiting");
                }
                Err(err) => {
                    candidate.slot.install_state = InstallState::Failed;
                    warn!(version = %version, error = %err, "worker install failed");
                }
            }
            outcome
        })
    }

    /// Wait for the pending candidate's install, if one is in progress.
    ///
    /// Resolves immediately when there is no candidate or its install already
    /// failed, since such a candidate will never be activated.
    pub async fn await_install(&self) -> LifecycleResult<()> {
        let install = {
            let next = self.next.lock();
            match next.as_ref() {
                Some(n) if n.slot.install_state != InstallState::Failed => n.install.clone(),
                _ => return Ok(()),
            }
        };
        install.await
    }

    /// Activate the waiting candidate and make it `current`.
    ///
    /// Resolves immediately unless `next` is waiting or already activating.
    /// Concurrent callers share a single activation, so the activate event
    /// is dispatched once per candidate.
    pub async fn activate_next(&self) -> LifecycleResult<()> {
        let activation = {
            let mut next = self.next.lock();
            let Some(candidate) = next.as_mut() else {
                return Ok(());
            };
            if let Some(activation) = &candidate.activation {
                activation.clone()
            } else if candidate.slot.activate_state == ActivateState::Waiting {
                candidate.slot.activate_state = ActivateState::Activating;
                let mut last = self.last_activation.lock();
                let activation = self.spawn_activation(&candidate.slot, last.take());
                candidate.activation = Some(activation.clone());
                *last = Some(activation.clone());
                activation
            } else {
                return Ok(());
            }
        };
        activation.await
    }

    fn spawn_activation(&self, slot: &WorkerSlot, prior: Option<Transition>) -> Transition {
        let current = Arc::clone(&self.current);
        let next = Arc::clone(&self.next);
        let mut slot = slot.clone();
        let limit = self.policy.activate_timeout;

        spawn_transition(Phase::Activate, slot.version.clone(), async move {
            if let Some(prior) = prior {
                // Only ordering matters here; the earlier candidate's outcome
                // was reported to its own callers.
                let _ = prior.await;
            }
            let outcome = run_extendable(&slot.instance, Phase::Activate, limit).await;

            let mut next = next.lock();
            let still_next = next
                .as_ref()
                .is_some_and(|n| n.slot.generation == slot.generation);
            match &outcome {
                Ok(()) => {
                    slot.install_state = InstallState::Installed;
                    slot.activate_state = ActivateState::Active;
                    let version = slot.version.clone();
                    let retired = current.swap(Some(Arc::new(slot)));
                    if still_next {
                        *next = None;
                    }
                    match retired {
                        Some(old) => info!(version = %version, retired = %old.version, "worker activated"),
                        None => info!(version = %version, "worker activated"),
                    }
                }
                Err(err) => {
                    if let Some(candidate) = next.as_mut().filter(|_| still_next) {
                        candidate.slot.activate_state = ActivateState::Redundant;
                        candidate.activation = None;
                    }
                    warn!(version = %slot.version, error = %err, "worker activation failed");
                }
            }
            outcome
        })
    }

    /// Readiness gate for a navigation: finish installing the candidate,
    /// then activate it.
    pub async fn prepare_navigation(&self) -> LifecycleResult<()> {
        self.await_install().await?;
        self.activate_next().await
    }

    /// Readiness gate for any request.
    ///
    /// Navigations always pass through [`prepare_navigation`]. Other requests
    /// only do so while no worker has been activated yet.
    ///
    /// [`prepare_navigation`]: LifecycleManager::prepare_navigation
    pub async fn prepare_request(&self, is_navigate: bool) -> LifecycleResult<()> {
        if is_navigate || self.current.load().is_none() {
            self.prepare_navigation().await
        } else {
            Ok(())
        }
    }

    /// Wait for the most recently started activation, whatever its outcome.
    pub async fn await_activation(&self) {
        let activation = self.last_activation.lock().clone();
        if let Some(activation) = activation {
            let _ = activation.await;
        }
    }
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("current", &self.current())
            .field("next", &self.next_slot())
            .field("policy", &self.policy)
            .finish()
    }
}


//! Worker lifecycle state machine.
//!
//! A [`LifecycleManager`] owns two slots. `current` serves requests; `next`
//! holds the most recently loaded candidate on its way through
//! install → waiting → activate. Navigations (and, before any worker is
//! serving, every request) pass through [`LifecycleManager::prepare_request`],
//! which finishes the candidate's install and swaps it in.
//!
//! Transitions run on spawned tasks and are shared: any number of callers can
//! await one, and each sees the same outcome.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod manager;
pub mod state;
pub mod transition;

pub use error::{LifecycleError, LifecycleResult};
pub use manager::{LifecycleManager, LifecyclePolicy, ReloadOutcome, WorkerSlot};
pub use state::{ActivateState, InstallState, Phase};
pub use transition::Transition;

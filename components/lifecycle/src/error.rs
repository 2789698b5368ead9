//! Lifecycle transition errors

use std::time::Duration;
use thiserror::Error;
use worker_runtime::DispatchError;

use crate::state::Phase;

/// Why an install or activate transition did not succeed.
///
/// Cloneable because a transition's outcome is shared by every caller
/// awaiting it.
#[derive(Debug, Clone, Error)]
pub enum LifecycleError {
    /// The worker rejected the extended lifetime
    #[error("{phase} of worker {version} rejected: {reason}")]
    Rejected {
        /// Transition
        phase: Phase,
        /// Worker version
        version: String,
        /// Rejection reason supplied by the worker
        reason: String,
    },

    /// The worker claimed the event and dropped it without settling
    #[error("{phase} of worker {version} was abandoned without settling")]
    Abandoned {
        /// Transition
        phase: Phase,
        /// Worker version
        version: String,
    },

    /// The worker claimed the event and did not settle it in time
    #[error("{phase} of worker {version} timed out after {limit:?}")]
    Timeout {
        /// Transition
        phase: Phase,
        /// Worker version
        version: String,
        /// Configured limit
        limit: Duration,
    },

    /// Dispatching the event failed
    #[error("{phase} of worker {version} failed: {source}")]
    Dispatch {
        /// Transition
        phase: Phase,
        /// Worker version
        version: String,
        /// Underlying dispatch failure
        #[source]
        source: DispatchError,
    },

    /// The task driving the transition died before producing a result
    #[error("{phase} task of worker {version} aborted")]
    Aborted {
        /// Transition
        phase: Phase,
        /// Worker version
        version: String,
    },
}

impl LifecycleError {
    /// Transition the error belongs to
    pub fn phase(&self) -> Phase {
        match self {
            LifecycleError::Rejected { phase, .. }
            | LifecycleError::Abandoned { phase, .. }
            | LifecycleError::Timeout { phase, .. }
            | LifecycleError::Dispatch { phase, .. }
            | LifecycleError::Aborted { phase, .. } => *phase,
        }
    }
}

/// Result type for lifecycle transitions
pub type LifecycleResult<T> = Result<T, LifecycleError>;

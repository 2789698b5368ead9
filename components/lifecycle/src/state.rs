//! Per-slot lifecycle states

use std::fmt;

/// Install progress of a worker slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    /// Built, install not yet dispatched
    None,
    /// Install event dispatched, not yet settled
    Installing,
    /// Install settled successfully
    Installed,
    /// Install rejected, abandoned, timed out or the dispatch failed
    Failed,
}

impl InstallState {
    /// Check if install reached a final outcome
    pub fn is_settled(&self) -> bool {
        matches!(self, InstallState::Installed | InstallState::Failed)
    }
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallState::None => write!(f, "none"),
            InstallState::Installing => write!(f, "installing"),
            InstallState::Installed => write!(f, "installed"),
            InstallState::Failed => write!(f, "failed"),
        }
    }
}

/// Activation progress of a worker slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivateState {
    /// Not installed yet
    None,
    /// Installed, waiting for a navigation to activate it
    Waiting,
    /// Activate event dispatched, not yet settled
    Activating,
    /// Serving requests
    Active,
    /// Activation failed; this slot will never serve
    Redundant,
}

impl ActivateState {
    /// Check if this state allows fetch interception
    pub fn can_intercept_fetch(&self) -> bool {
        matches!(self, ActivateState::Active)
    }

    /// Check if the slot is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, ActivateState::Redundant)
    }
}

impl fmt::Display for ActivateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivateState::None => write!(f, "none"),
            ActivateState::Waiting => write!(f, "waiting"),
            ActivateState::Activating => write!(f, "activating"),
            ActivateState::Active => write!(f, "active"),
            ActivateState::Redundant => write!(f, "redundant"),
        }
    }
}

/// Which lifecycle transition an operation belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Install
    Install,
    /// Activate (and swap)
    Activate,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Install => write!(f, "install"),
            Phase::Activate => write!(f, "activate"),
        }
    }
}

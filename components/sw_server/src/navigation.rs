//! Out-of-band navigation marker

use std::sync::atomic::{AtomicBool, Ordering};

/// Set by the control channel, consumed by the next HTTP request.
///
/// Every request consumes it whether or not it was set, so a flag raised
/// for one page load never leaks onto a later one.
#[derive(Debug, Default)]
pub struct NavigationFlag {
    raised: AtomicBool,
}

impl NavigationFlag {
    /// Create a lowered flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the next request as a navigation
    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    /// Read and lower the flag in one step
    pub fn take(&self) -> bool {
        self.raised.swap(false, Ordering::SeqCst)
    }

    /// Read the flag without lowering it
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }
}

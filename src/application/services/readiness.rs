//! Readiness gate - closed until the startup load pass has finished

use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide flag opened exactly once
#[derive(Debug, Default)]
pub struct ReadinessGate {
    open: AtomicBool,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Open the gate; returns false if it was already open
    pub fn open(&self) -> bool {
        !self.open.swap(true, Ordering::AcqRel)
    }
}

//! Runtime maintenance toggle.
//!
//! Read on every request, flipped by the admin API. Lock-free atomic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process-wide enabled flag. Cheap to clone (Arc); clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct MaintenanceSwitch {
    inner: Arc<AtomicBool>,
}

impl MaintenanceSwitch {
    pub fn new(enabled: bool) -> Self {
        Self {
            inner: Arc::new(AtomicBool::new(enabled)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.load(Ordering::Relaxed)
    }

    /// Set the flag, returning the previous value.
    pub fn set(&self, enabled: bool) -> bool {
        self.inner.swap(enabled, Ordering::Relaxed)
    }
}

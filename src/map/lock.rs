//! Advisory refresh lock
//!
//! The lock is cooperative, not exclusionary. Holders never wait for it: a
//! refresh that finds it taken skips its cycle and is rescheduled with a
//! longer delay. Clones share the same flag, so every party that was handed
//! a clone (other engines, worker handles) sees the same state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared non-blocking refresh flag
#[derive(Debug, Clone, Default)]
pub struct RefreshLock {
    flag: Arc<AtomicBool>,
}

impl RefreshLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing flag shared with other holders
    pub fn shared(flag: Arc<AtomicBool>) -> Self {
        RefreshLock { flag }
    }

    /// Take the lock if nobody holds it
    pub fn try_acquire(&self) -> Option<RefreshGuard> {
        self.flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RefreshGuard {
                flag: self.flag.clone(),
            })
    }

    pub fn is_locked(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Held refresh lock, released on drop
#[derive(Debug)]
pub struct RefreshGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

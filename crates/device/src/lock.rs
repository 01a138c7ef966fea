//! Per-instance exclusive access.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Non-blocking per-device lock.
///
/// `try_acquire` never waits: a held lock means the caller is rejected. The
/// returned [`LockGuard`] releases the lock when dropped, so whichever code
/// path ends the operation (watchdog thread or failed submission) releases it
/// exactly once.
#[derive(Debug, Clone, Default)]
pub struct ExclusiveLock {
    held: Arc<AtomicBool>,
}

impl ExclusiveLock {
    /// Create an unlocked lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take the lock without blocking.
    pub fn try_acquire(&self) -> Option<LockGuard> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| LockGuard {
                held: Arc::clone(&self.held),
            })
    }

    /// Whether an operation currently holds the lock.
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Proof of exclusive access; releases the lock on drop.
#[derive(Debug)]
pub struct LockGuard {
    held: Arc<AtomicBool>,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
        debug!("lock released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_rejected() {
        let lock = ExclusiveLock::new();
        let guard = lock.try_acquire();
        assert!(guard.is_some());
        assert!(lock.is_held());
        assert!(lock.try_acquire().is_none());

        drop(guard);
        assert!(!lock.is_held());
        assert!(lock.try_acquire().is_some());
    }

    #[test]
    fn test_guard_moves_across_threads() {
        let lock = ExclusiveLock::new();
        let guard = lock.try_acquire().unwrap();
        std::thread::spawn(move || drop(guard)).join().unwrap();
        assert!(!lock.is_held());
    }
}

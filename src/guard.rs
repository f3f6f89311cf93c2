//! Process-wide execution lock
//!
//! At most one orchestration run may drive the remote queue at a time. The
//! lock is a shared atomic flag; holding an [`ExecutionGuard`] is holding the
//! lock, and dropping it releases the lock on every exit path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use tracing::debug;

use crate::error::GroupExecError;

static GLOBAL_LOCK: Lazy<Arc<ExecutionLock>> = Lazy::new(|| Arc::new(ExecutionLock::new()));

#[derive(Debug, Default)]
pub struct ExecutionLock {
    locked: AtomicBool,
}

impl ExecutionLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock shared by every orchestrator in this process
    pub fn global() -> Arc<ExecutionLock> {
        Arc::clone(&GLOBAL_LOCK)
    }

    /// Take the lock, or fail with `GuardLocked` if another run holds it
    pub fn try_acquire(self: &Arc<Self>) -> Result<ExecutionGuard, GroupExecError> {
        self.locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| GroupExecError::GuardLocked)?;
        debug!("Execution lock acquired");
        Ok(ExecutionGuard {
            lock: Arc::clone(self),
        })
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }
}

/// Proof of holding the execution lock; releases it on drop
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ExecutionGuard {
    lock: Arc<ExecutionLock>,
}

impl Drop for ExecutionGuard {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
        debug!("Execution lock released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_rejected_until_release() {
        let lock = Arc::new(ExecutionLock::new());
        let guard = lock.try_acquire().unwrap();
        assert!(lock.is_locked());
        assert!(matches!(lock.try_acquire(), Err(GroupExecError::GuardLocked)));

        drop(guard);
        assert!(!lock.is_locked());
        assert!(lock.try_acquire().is_ok());
    }

    #[test]
    fn test_release_on_panic_unwind() {
        let lock = Arc::new(ExecutionLock::new());
        let inner = Arc::clone(&lock);
        let result = std::panic::catch_unwind(move || {
            let _guard = inner.try_acquire().unwrap();
            panic!("boom");
        });
        assert!(result.is_err());
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_only_one_thread_wins() {
        let lock = Arc::new(ExecutionLock::new());
        let barrier = Arc::new(std::sync::Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    // Keep the guard alive until every thread has tried
                    let guard = lock.try_acquire().ok();
                    std::thread::sleep(std::time::Duration::from_millis(50));
                    guard.is_some()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_global_lock_is_shared() {
        assert!(Arc::ptr_eq(&ExecutionLock::global(), &ExecutionLock::global()));
    }
}

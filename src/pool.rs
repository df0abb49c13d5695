//! Reusable session-state pool.
//!
//! # Responsibilities
//! - Recycle expensive per-connection state across accept cycles
//! - Internal synchronization (callers never hold a lock)
//! - No eviction: idle objects are retained for the life of the process
//!
//! The pool does not validate what it is handed. Callers reset an object
//! before returning it, and the accept path allocates through the
//! application-supplied factory whenever the idle set is empty.

use std::sync::{Mutex, PoisonError};

/// A free-list of previously-used session state objects.
#[derive(Debug)]
pub struct SessionPool<T> {
    idle: Mutex<Vec<T>>,
}

impl<T> SessionPool<T> {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Take an idle object. `None` means the caller should allocate fresh.
    pub fn get(&self) -> Option<T> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).pop()
    }

    /// Return a reset object to the idle set for future reuse.
    pub fn put(&self, value: T) {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(value);
    }

    /// Number of idle objects currently held.
    pub fn len(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the idle set is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for SessionPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn empty_pool_signals_fresh_allocation() {
        let pool: SessionPool<Vec<u8>> = SessionPool::new();
        assert!(pool.get().is_none());
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn put_then_get_reuses_object() {
        let pool = SessionPool::new();
        pool.put(vec![1u8, 2, 3]);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.get(), Some(vec![1u8, 2, 3]));
        assert!(pool.is_empty());
    }

    #[test]
    fn concurrent_get_put_never_duplicates() {
        let pool = Arc::new(SessionPool::new());
        for i in 0..8u64 {
            pool.put(i);
        }
        let mut handles = Vec::new();
        for _ in 0..4 {
            let pool = Arc::clone(&pool);
            handles.push(std::thread::spawn(move || {
                let mut taken = Vec::new();
                for _ in 0..50 {
                    if let Some(v) = pool.get() {
                        taken.push(v);
                        pool.put(v);
                    }
                }
                taken
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        // All eight distinct objects survive the churn.
        let mut remaining = Vec::new();
        while let Some(v) = pool.get() {
            remaining.push(v);
        }
        remaining.sort_unstable();
        assert_eq!(remaining, (0..8u64).collect::<Vec<_>>());
    }
}

//! Per-key mutual exclusion.
//!
//! [`ConcurrencyGuard`] hands out one tokio mutex per session key. The agent
//! loop uses one to serialize turns of a session, and the compaction
//! controller uses another to keep at most one compaction in flight per
//! session. Entries are created on first use and never removed.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// A map of lazily created per-key locks. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyGuard {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl ConcurrencyGuard {
    /// Create an empty guard.
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Wait for the lock on `key`.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        self.entry(key).await.lock_owned().await
    }

    /// Take the lock on `key` if nobody holds it.
    ///
    /// The returned guard owns its mutex, so it can be moved into a spawned
    /// task and is released whenever that task ends.
    ///
    /// # Example
    /// ```
    /// use convoclaw::agent::ConcurrencyGuard;
    ///
    /// # tokio_test::block_on(async {
    /// let guard = ConcurrencyGuard::new();
    /// let held = guard.try_acquire("telegram:1").await;
    /// assert!(held.is_some());
    /// assert!(guard.try_acquire("telegram:1").await.is_none());
    /// drop(held);
    /// assert!(guard.try_acquire("telegram:1").await.is_some());
    /// # });
    /// ```
    pub async fn try_acquire(&self, key: &str) -> Option<OwnedMutexGuard<()>> {
        self.entry(key).await.try_lock_owned().ok()
    }

    /// Number of keys that have ever been locked.
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    /// Whether no key has been locked yet.
    pub async fn is_empty(&self) -> bool {
        self.locks.lock().await.is_empty()
    }
}

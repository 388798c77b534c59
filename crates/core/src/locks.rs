//! Exclusive per-row locks.
//!
//! Every read-modify-write of a transaction, standing order or batch happens
//! while holding the [`RowGuard`] for its id. Reads never take a lock.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockTable<K> = DashMap<K, Arc<Mutex<()>>>;

/// A keyed set of async mutexes, one per row id.
///
/// Entries are created on first use and removed once no task holds or waits
/// for them.
pub struct RowLocks<K: Eq + Hash + Clone> {
    table: Arc<LockTable<K>>,
}

impl<K: Eq + Hash + Clone> RowLocks<K> {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: Arc::new(DashMap::new()),
        }
    }

    /// Waits for and acquires the lock for `key`.
    pub async fn lock(&self, key: &K) -> RowGuard<K> {
        let mutex = Arc::clone(&self.table.entry(key.clone()).or_default());
        let guard = mutex.lock_owned().await;
        RowGuard {
            key: key.clone(),
            guard: Some(guard),
            table: Arc::clone(&self.table),
        }
    }

    /// Returns true if some task currently holds the lock for `key`.
    pub fn is_locked(&self, key: &K) -> bool {
        self.table
            .get(key)
            .is_some_and(|mutex| mutex.try_lock().is_err())
    }

    /// Number of keys with a live lock entry.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns true if no key has a live lock entry.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl<K: Eq + Hash + Clone> Default for RowLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone> Clone for RowLocks<K> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
        }
    }
}

/// Proof that the holder owns the lock for one row.
pub struct RowGuard<K: Eq + Hash + Clone> {
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
    table: Arc<LockTable<K>>,
}

impl<K: Eq + Hash + Clone> RowGuard<K> {
    /// The locked row id.
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K: Eq + Hash + Clone + fmt::Debug> fmt::Debug for RowGuard<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowGuard").field("key", &self.key).finish()
    }
}

impl<K: Eq + Hash + Clone> Drop for RowGuard<K> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // The table itself holds one reference; anything above that is a waiter.
        self.table
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

//! Synchronization primitives.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Per-key async mutex.
///
/// Different keys lock independently while operations on the same key are
/// serialized. Record files carry a timestamp in their name, so the map keeps
/// growing; callers drop idle entries with [`KeyedLocks::cleanup_stale`].
///
/// ```ignore
/// let locks = KeyedLocks::new();
/// let lock = locks.get(path.clone());
/// let _guard = lock.lock().await;
/// ```
pub struct KeyedLocks<K: Eq + Hash = String> {
    locks: Arc<DashMap<K, (Arc<Mutex<()>>, Instant)>>,
}

impl<K: Eq + Hash> Clone for KeyedLocks<K> {
    fn clone(&self) -> Self {
        Self {
            locks: Arc::clone(&self.locks),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Get or create the lock for `key`, refreshing its last-access time.
    pub fn get(&self, key: K) -> Arc<Mutex<()>> {
        let now = Instant::now();
        self.locks
            .entry(key)
            .and_modify(|(_, last_access)| *last_access = now)
            .or_insert_with(|| (Arc::new(Mutex::new(())), now))
            .0
            .clone()
    }

    /// Drop locks idle for longer than `max_age` that nobody holds.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_stale(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let before = self.locks.len();
        // strong_count == 1: only the map holds the lock
        self.locks.retain(|_, (lock, last_access)| {
            Arc::strong_count(lock) > 1 || now.duration_since(*last_access) <= max_age
        });
        before - self.locks.len()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

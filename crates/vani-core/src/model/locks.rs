//! Keyed async locks with a guarded lock table

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

/// Table of per-key async mutexes
///
/// The coarse `table` lock is only held while looking up, inserting or
/// pruning an entry; the per-key mutex it hands out is what callers hold
/// across downloads and loads. Entries stay until [`KeyedLocks::release_idle`]
/// drops one nobody holds.
#[derive(Debug)]
pub struct KeyedLocks<K> {
    table: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the lock for `key`
    pub fn lock_for(&self, key: &K) -> Arc<AsyncMutex<()>> {
        let mut table = self.table.lock();
        table
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Drop the entry for `key` if no caller holds or waits on it
    ///
    /// Callers must drop their own guard and `Arc` first. Returns whether the
    /// entry was removed.
    pub fn release_idle(&self, key: &K) -> bool {
        let mut table = self.table.lock();
        match table.get(key) {
            Some(lock) if Arc::strong_count(lock) == 1 => {
                table.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Number of keys currently in the table
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    /// Whether no lock has been created yet
    pub fn is_empty(&self) -> bool {
        self.table.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_same_key_same_lock() {
        let locks = KeyedLocks::new();
        let a = locks.lock_for(&"hindi");
        let b = locks.lock_for(&"hindi");
        let c = locks.lock_for(&"tamil");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_release_idle_keeps_held_locks() {
        let locks = KeyedLocks::new();

        let held = locks.lock_for(&"odia");
        let guard = held.lock().await;
        assert!(!locks.release_idle(&"odia"));
        drop(guard);

        let waiting = locks.lock_for(&"odia");
        drop(held);
        assert!(!locks.release_idle(&"odia"));
        assert_eq!(locks.len(), 1);

        drop(waiting);
        assert!(locks.release_idle(&"odia"));
        assert!(locks.is_empty());
        assert!(!locks.release_idle(&"odia"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_lock_serializes_holders() {
        let locks = Arc::new(KeyedLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = inside.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let lock = locks.lock_for(&"bengali");
                let _guard = lock.lock().await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }
}

//! In-process read cache owned by the store
//!
//! Entries live until they are invalidated or the cache is cleared; there is
//! no eviction and no size bound.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};

/// A keyed cache of decoded documents
#[derive(Debug)]
pub struct DocumentCache<K, V> {
    entries: Mutex<HashMap<K, V>>,
}

impl<K, V> DocumentCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Cloned entry for `key`, if cached
    pub fn get(&self, key: &K) -> Option<V> {
        self.lock().get(key).cloned()
    }

    pub fn insert(&self, key: K, value: V) {
        self.lock().insert(key, value);
    }

    /// Drop the entry for `key`; returns whether one was present
    pub fn invalidate(&self, key: &K) -> bool {
        self.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, V>> {
        lock_unpoisoned(&self.entries)
    }
}

/// Lock a mutex, recovering the guard if a previous holder panicked.
///
/// Every map guarded this way stays structurally valid across a panic.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<K, V> Default for DocumentCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

//! Key-to-value pool with explicit release.
//!
//! The pool decouples "who is currently writing coverage for context X"
//! from "who is responsible for shipping X's coverage". Application threads
//! get-or-create values in the active map; stopping a context moves its
//! value into a FIFO released queue that only the background sender drains.
//! The release and drain both pass through the queue mutex, which is what
//! establishes happens-before between a writer's probe stores and the
//! sender's subsequent reads.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

/// Concurrent pool of per-key values with an active map and a released
/// queue. Multi-producer on both sides; single consumer drains the queue.
pub struct DataPool<K, V> {
    active: Mutex<HashMap<K, Arc<V>>>,
    released: Mutex<VecDeque<Arc<V>>>,
}

impl<K, V> DataPool<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
            released: Mutex::new(VecDeque::new()),
        }
    }

    /// Return the active value for `key`, creating it with `factory` when
    /// absent. Concurrent callers for the same key receive the same value;
    /// the insert is atomic under the active-map lock.
    pub fn get_or_put(&self, key: K, factory: impl FnOnce() -> V) -> Arc<V> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(active.entry(key).or_insert_with(|| Arc::new(factory())))
    }

    /// Look up the active value for `key` without creating it.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(Arc::clone)
    }

    /// Move the active value for `key` into the released queue. The key is
    /// removed from the active map, so a later `get_or_put` starts fresh.
    /// No-op when the key is absent.
    pub fn release(&self, key: &K) {
        let value = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        if let Some(value) = value {
            self.released
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push_back(value);
        }
    }

    /// Release every active value whose key matches `predicate`, returning
    /// handles to the released values. The handles are the same values now
    /// waiting in the queue; callers use them for bookkeeping, the queue
    /// remains the delivery path.
    pub fn release_where(&self, predicate: impl Fn(&K) -> bool) -> Vec<Arc<V>> {
        let mut taken = Vec::new();
        {
            let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            let keys: Vec<K> = active
                .keys()
                .filter(|key| predicate(key))
                .cloned()
                .collect();
            for key in keys {
                if let Some(value) = active.remove(&key) {
                    taken.push(value);
                }
            }
        }
        let mut released = self
            .released
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for value in &taken {
            released.push_back(Arc::clone(value));
        }
        taken
    }

    /// Drop the active value for `key` without queueing it. Returns whether
    /// a value was discarded. This is cancellation: collected coverage is
    /// lost by design, and any thread still holding the value keeps a
    /// structurally valid reference.
    pub fn discard(&self, key: &K) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    /// Discard every active value whose key matches `predicate`, returning
    /// the number dropped.
    pub fn discard_where(&self, predicate: impl Fn(&K) -> bool) -> usize {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let keys: Vec<K> = active
            .keys()
            .filter(|key| predicate(key))
            .cloned()
            .collect();
        let count = keys.len();
        for key in keys {
            active.remove(&key);
        }
        count
    }

    /// Lazily drain the released queue. Each value is yielded exactly once;
    /// values released while the iterator is live are picked up by the same
    /// drain. Intended for a single consumer.
    pub fn poll_released(&self) -> impl Iterator<Item = Arc<V>> + '_ {
        std::iter::from_fn(move || {
            self.released
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front()
        })
    }

    /// Number of active values.
    #[must_use]
    pub fn active_len(&self) -> usize {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of values waiting in the released queue.
    #[must_use]
    pub fn released_len(&self) -> usize {
        self.released
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<K, V> Default for DataPool<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for DataPool<K, V>
where
    K: Eq + Hash + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataPool")
            .field("active", &self.active_len())
            .field("released", &self.released_len())
            .finish()
    }
}

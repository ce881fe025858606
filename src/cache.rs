//! In-process caches for hub lookups.
//!
//! Both caches are plain objects owned by the client and passed by reference
//! to the code that uses them:
//!
//! - [`MappingCache`]: model id to provider mapping, kept for the lifetime of
//!   the cache with no expiry and no size bound.
//! - [`TtlCache`]: entries expire after a fixed TTL, and once the cache grows
//!   past its capacity the oldest entry by insertion is evicted.

use crate::mapping::ProviderMapping;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Unbounded cache of provider mappings, keyed by hub model id.
#[derive(Debug, Default)]
pub struct MappingCache {
    entries: RwLock<HashMap<String, Arc<ProviderMapping>>>,
}

impl MappingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, model_id: &str) -> Option<Arc<ProviderMapping>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(model_id).cloned()
    }

    /// Last write wins.
    pub fn insert(&self, model_id: impl Into<String>, mapping: Arc<ProviderMapping>) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(model_id.into(), mapping);
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
struct TimedEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// Size-bounded cache with a fixed time-to-live.
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: Mutex<IndexMap<String, TimedEntry<V>>>,
    ttl: Duration,
    capacity: usize,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
            ttl,
            capacity,
        }
    }

    /// Fetch a live entry. Expired entries are removed on access.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let expired = match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.shift_remove(key);
        }
        None
    }

    /// Insert at the back of the eviction order, then evict the oldest entry
    /// if over capacity.
    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.insert_at(key.into(), value, Instant::now());
    }

    fn insert_at(&self, key: String, value: V, inserted_at: Instant) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.shift_remove(&key);
        entries.insert(key, TimedEntry { value, inserted_at });
        if entries.len() > self.capacity {
            entries.shift_remove_index(0);
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn insert_aged(&self, key: &str, value: V, age: Duration) {
        let now = Instant::now();
        self.insert_at(key.to_string(), value, now.checked_sub(age).unwrap_or(now));
    }
}

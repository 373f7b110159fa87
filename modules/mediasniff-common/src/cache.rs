//! Bounded LRU cache with hit/miss accounting.
//!
//! The one store in the system that admits concurrent reads and writes;
//! everything else is single-writer behind the core loop.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub len: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Inner<K: Hash + Eq, V> {
    map: lru::LruCache<K, V>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Access-order bounded mapping. Values are cloned out; keep them cheap
/// (Arc or small strings).
pub struct SharedCache<K: Hash + Eq, V: Clone> {
    inner: Mutex<Inner<K, V>>,
}

impl<K: Hash + Eq, V: Clone> SharedCache<K, V> {
    /// A zero capacity is clamped to a single entry.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                map: lru::LruCache::new(capacity),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        match inner.map.get(key).cloned() {
            Some(v) => {
                inner.hits += 1;
                Some(v)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    pub fn put(&self, key: K, value: V) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let will_evict = inner.map.len() == inner.map.cap().get() && !inner.map.contains(&key);
        if will_evict {
            inner.evictions += 1;
        }
        inner.map.put(key, value);
    }

    /// Look up `key`, computing and inserting on a miss.
    pub fn get_or_insert_with(&self, key: K, compute: impl FnOnce() -> V) -> V {
        if let Some(v) = self.get(&key) {
            return v;
        }
        let v = compute();
        self.put(key, v.clone());
        v
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.map.pop(key)
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.map.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            len: inner.map.len(),
            capacity: inner.map.cap().get(),
        }
    }
}

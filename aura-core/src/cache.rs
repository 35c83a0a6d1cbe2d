use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// Hit/miss counters for a cache, snapshotted for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
}

/// Bounded LRU cache whose entries expire after a fixed TTL. Expired
/// entries are never served; they are evicted on the access that finds
/// them stale. Each cache owns its lock and shares it with nothing else.
pub struct TtlCache<K: Hash + Eq, V> {
    inner: Mutex<LruCache<K, Entry<V>>>,
    ttl: Duration,
    stats: Mutex<CacheStats>,
}

impl<K: Hash + Eq, V: Clone> TtlCache<K, V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl,
            stats: Mutex::new(CacheStats::default()),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        let expired = match inner.get(key) {
            Some(entry) if entry.inserted_at.elapsed() <= self.ttl => {
                let value = entry.value.clone();
                self.stats.lock().hits += 1;
                return Some(value);
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            inner.pop(key);
            self.stats.lock().expirations += 1;
        }
        self.stats.lock().misses += 1;
        None
    }

    pub fn insert(&self, key: K, value: V) {
        self.inner.lock().put(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop a single entry, e.g. after an authoritative miss invalidates a
    /// previously positive hit.
    pub fn invalidate(&self, key: &K) {
        self.inner.lock().pop(key);
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        *self.stats.lock()
    }
}

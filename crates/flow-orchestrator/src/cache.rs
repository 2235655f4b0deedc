use dashmap::DashMap;
use std::borrow::Borrow;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

/// Internal cache entry with timestamp
struct CacheEntry<V> {
    data: V,
    cached_at: Instant,
}

/// Result of a cache lookup. `fresh` is false once the entry reached its TTL.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheLookup<V> {
    pub value: V,
    pub fresh: bool,
}

/// Concurrent TTL cache. Expired entries stay readable (as stale) until the
/// next [`sweep`](Self::sweep).
pub struct TtlCache<K, V> {
    entries: DashMap<K, CacheEntry<V>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get<Q>(&self, key: &Q) -> Option<CacheLookup<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(key).map(|entry| CacheLookup {
            value: entry.data.clone(),
            fresh: entry.cached_at.elapsed() < self.ttl,
        })
    }

    /// Value only if the entry is still within its TTL.
    pub fn get_fresh<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).filter(|l| l.fresh).map(|l| l.value)
    }

    pub fn put(&self, key: K, value: V) {
        self.entries.insert(
            key,
            CacheEntry {
                data: value,
                cached_at: Instant::now(),
            },
        );
    }

    /// Drop entries at or past their TTL. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.cached_at.elapsed() < self.ttl);
        before.saturating_sub(self.entries.len())
    }

    pub fn force_invalidate<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

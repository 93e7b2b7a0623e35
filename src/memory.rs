//! In-memory cache tier
//!
//! A bounded memoization table with TTL expiry and least-recently-used
//! eviction. The table itself is single-writer; concurrent callers must wrap
//! it in a mutex (as [`crate::CachedClient`] does), since eviction-then-insert
//! is a read-modify-write sequence.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use tracing::trace;

/// One cached value plus the bookkeeping the tier needs.
///
/// TTL is measured from `inserted_at`; eviction order is ranked by
/// `last_access`, so a hit protects an entry from eviction without extending
/// its lifetime.
#[derive(Debug, Clone)]
struct Slot<V> {
    value: V,
    inserted_at: Instant,
    last_access: Instant,
}

/// Snapshot of the tier's state, as reported by [`MemoryCache::stats`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MemoryStats {
    /// Entries currently held
    pub size: usize,
    /// Configured capacity
    pub max_entries: usize,
    /// Configured time-to-live
    pub ttl: Duration,
}

/// Bounded TTL/LRU memoization table.
///
/// Values are returned by clone, so `V` is typically cheap to clone or an
/// `Arc`. Keys are whatever call signature the caller considers identifying;
/// the orchestrator uses (source, url, fingerprint).
#[derive(Debug)]
pub struct MemoryCache<K, V> {
    entries: HashMap<K, Slot<V>>,
    ttl: Duration,
    max_entries: usize,
}

impl<K: Eq + Hash + Clone, V: Clone> MemoryCache<K, V> {
    /// Creates an empty table with the given TTL and capacity.
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            max_entries,
        }
    }

    /// Looks up a value, refreshing its last-access time on a hit.
    ///
    /// An entry older than the TTL is removed and reported as a miss.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let now = Instant::now();
        let expired = match self.entries.get_mut(key) {
            Some(slot) => {
                if now.duration_since(slot.inserted_at) < self.ttl {
                    slot.last_access = now;
                    return Some(slot.value.clone());
                }
                true
            }
            None => false,
        };
        if expired {
            self.entries.remove(key);
            trace!("memory cache entry expired");
        }
        None
    }

    /// Inserts a value, evicting the least-recently-accessed entry first if
    /// the table is at capacity.
    ///
    /// Replacing an existing key never evicts; the slot is refreshed in
    /// place with new timestamps.
    pub fn insert(&mut self, key: K, value: V) {
        let now = Instant::now();
        let slot = Slot {
            value,
            inserted_at: now,
            last_access: now,
        };
        if let Some(existing) = self.entries.get_mut(&key) {
            *existing = slot;
            return;
        }
        if self.entries.len() >= self.max_entries {
            self.evict_lru();
        }
        self.entries.insert(key, slot);
    }

    /// Empties the table and all its bookkeeping.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Reports the tier's current state without mutating it.
    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            size: self.entries.len(),
            max_entries: self.max_entries,
            ttl: self.ttl,
        }
    }

    fn evict_lru(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, slot)| slot.last_access)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
            trace!("memory cache evicted least-recently-used entry");
        }
    }
}

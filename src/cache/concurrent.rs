//! Concurrency-Optimized Storage
//!
//! Entries live in a `DashMap`, which gives per-key atomicity without a
//! map-wide lock. The sweep schedule is a single atomic cell updated with
//! read-modify-write operations, so writers never take a lock for it.

use std::fmt;
use std::hash::Hash;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::cache::schedule::{AtomicSchedule, SweepPlan};
use crate::cache::store::{Storage, Swept, Written};
use crate::cache::CacheEntry;

/// Storage suited to read-heavy workloads.
pub struct ConcurrentMap<K, V> {
    entries: DashMap<K, CacheEntry<V>>,
    schedule: AtomicSchedule,
}

impl<K: Eq + Hash, V> Default for ConcurrentMap<K, V> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
            schedule: AtomicSchedule::new(),
        }
    }
}

impl<K: Eq + Hash, V> fmt::Debug for ConcurrentMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentMap")
            .field("len", &self.entries.len())
            .field("next_sweep_at", &self.schedule.load())
            .finish()
    }
}

impl<K: Eq + Hash + Clone, V> ConcurrentMap<K, V> {
    fn reschedule(&self, expires_at: Option<Instant>) -> bool {
        expires_at.map_or(false, |at| self.schedule.lower_to(at))
    }

    fn scan(&self, now: Instant) -> (Vec<K>, Option<Instant>) {
        let mut plan = SweepPlan::new(now);
        for item in self.entries.iter() {
            plan.observe(item.key(), item.value());
        }
        plan.into_parts()
    }

    // A key rewritten since the scan holds a fresh entry and stays.
    fn evict(&self, now: Instant, expired: Vec<K>) -> Vec<(K, V)> {
        expired
            .into_iter()
            .filter_map(|key| {
                self.entries
                    .remove_if(&key, |_, entry| entry.is_expired_at(now))
                    .map(|(key, entry)| (key, entry.value))
            })
            .collect()
    }
}

impl<K, V> Storage<K, V> for ConcurrentMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    fn insert(&self, key: K, entry: CacheEntry<V>) -> Written<V> {
        let expires_at = entry.expires_at;
        let previous = self.entries.insert(key, entry).map(|old| old.value);
        Written {
            previous,
            rescheduled: self.reschedule(expires_at),
        }
    }

    fn insert_if_absent(&self, key: K, entry: CacheEntry<V>) -> Option<Written<V>> {
        let expires_at = entry.expires_at;
        match self.entries.entry(key) {
            Entry::Occupied(_) => return None,
            Entry::Vacant(slot) => {
                slot.insert(entry);
            }
        }
        Some(Written {
            previous: None,
            rescheduled: self.reschedule(expires_at),
        })
    }

    fn remove(&self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|(_, entry)| entry.value)
    }

    fn clear(&self) {
        // Reset first: a write landing in between keeps its schedule.
        self.schedule.reset();
        self.entries.clear();
    }

    fn for_each(&self, visitor: &mut dyn FnMut(&K, &V)) {
        for item in self.entries.iter() {
            visitor(item.key(), &item.value().value);
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn next_sweep_at(&self) -> Option<Instant> {
        self.schedule.load()
    }

    fn sweep(&self, now: Instant) -> Swept<K, V> {
        self.schedule.begin_sweep();
        let (expired, next_sweep_at) = self.scan(now);
        let evicted = self.evict(now, expired);
        self.schedule.settle(next_sweep_at);

        Swept {
            evicted,
            next_sweep_at,
        }
    }
}

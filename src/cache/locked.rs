//! Exclusively-Locked Storage
//!
//! A `HashMap` and its sweep schedule behind one reader-writer lock. Reads
//! share the lock; writes and sweeps hold it exclusively, so the schedule
//! can never disagree with the entries it was computed from.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::RwLock;
use tokio::time::Instant;

use crate::cache::schedule::{advance, SweepPlan};
use crate::cache::store::{Storage, Swept, Written};
use crate::cache::CacheEntry;

/// Storage suited to write-heavy or mixed workloads.
#[derive(Debug)]
pub struct LockedMap<K, V> {
    inner: RwLock<LockedInner<K, V>>,
}

#[derive(Debug)]
struct LockedInner<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    next_sweep_at: Option<Instant>,
}

impl<K, V> Default for LockedMap<K, V> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(LockedInner {
                entries: HashMap::new(),
                next_sweep_at: None,
            }),
        }
    }
}

impl<K, V> Storage<K, V> for LockedMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Option<V> {
        self.inner
            .read()
            .entries
            .get(key)
            .map(|entry| entry.value.clone())
    }

    fn insert(&self, key: K, entry: CacheEntry<V>) -> Written<V> {
        let expires_at = entry.expires_at;
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let previous = inner.entries.insert(key, entry).map(|old| old.value);
        let rescheduled = advance(&mut inner.next_sweep_at, expires_at);
        Written {
            previous,
            rescheduled,
        }
    }

    fn insert_if_absent(&self, key: K, entry: CacheEntry<V>) -> Option<Written<V>> {
        let expires_at = entry.expires_at;
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        match inner.entries.entry(key) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(entry);
                Some(Written {
                    previous: None,
                    rescheduled: advance(&mut inner.next_sweep_at, expires_at),
                })
            }
        }
    }

    fn remove(&self, key: &K) -> Option<V> {
        self.inner
            .write()
            .entries
            .remove(key)
            .map(|entry| entry.value)
    }

    fn clear(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.next_sweep_at = None;
    }

    fn for_each(&self, visitor: &mut dyn FnMut(&K, &V)) {
        let inner = self.inner.read();
        for (key, entry) in &inner.entries {
            visitor(key, &entry.value);
        }
    }

    fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    fn next_sweep_at(&self) -> Option<Instant> {
        self.inner.read().next_sweep_at
    }

    fn sweep(&self, now: Instant) -> Swept<K, V> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;

        let mut plan = SweepPlan::new(now);
        for (key, entry) in &inner.entries {
            plan.observe(key, entry);
        }
        let (expired, next_sweep_at) = plan.into_parts();

        let evicted = expired
            .into_iter()
            .filter_map(|key| {
                inner
                    .entries
                    .remove(&key)
                    .map(|entry| (key, entry.value))
            })
            .collect();
        inner.next_sweep_at = next_sweep_at;

        Swept {
            evicted,
            next_sweep_at,
        }
    }
}

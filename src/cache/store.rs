//! Cache Store Module
//!
//! The storage interface both strategies implement, and the `CacheStore`
//! front that resolves TTLs, keeps the reaper's schedule current and
//! records statistics.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tracing::{trace, warn};

use crate::cache::eviction::EvictionListener;
use crate::cache::stats::StatsRecorder;
use crate::cache::{CacheEntry, CacheStats, ConcurrentMap, Expiration, LockedMap};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::tasks::{spawn_reaper, Reaper};

/// Capacity of the writer → reaper wake channel. One pending wake is
/// enough because the reaper re-reads the schedule every time it wakes.
pub(crate) const WAKE_CAPACITY: usize = 1;

// == Storage Trait ==
/// Outcome of a write against a [`Storage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Written<V> {
    /// Value the key held before the write
    pub previous: Option<V>,
    /// True if the write moved the next sweep earlier
    pub rescheduled: bool,
}

/// Outcome of one sweep over a [`Storage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Swept<K, V> {
    /// Entries removed because they had expired
    pub evicted: Vec<(K, V)>,
    /// Instant of the next sweep, None when nothing left can expire
    pub next_sweep_at: Option<Instant>,
}

/// A key → entry mapping together with its sweep schedule.
///
/// Implementations differ only in locking discipline. Reads never look at
/// expiration instants: an expired entry stays visible until a sweep
/// removes it.
pub trait Storage<K, V>: Default + Send + Sync + 'static {
    /// Returns a clone of the stored value, expired or not.
    fn get(&self, key: &K) -> Option<V>;

    /// Stores `entry`, overwriting any existing one, and lowers the
    /// schedule if the entry expires before it.
    fn insert(&self, key: K, entry: CacheEntry<V>) -> Written<V>;

    /// Stores `entry` only when `key` is absent. Returns None, leaving the
    /// existing entry untouched, when it is present.
    fn insert_if_absent(&self, key: K, entry: CacheEntry<V>) -> Option<Written<V>>;

    /// Removes the entry for `key`, returning its value.
    fn remove(&self, key: &K) -> Option<V>;

    /// Removes every entry and drops the schedule.
    fn clear(&self);

    /// Visits every stored pair in unspecified order.
    ///
    /// The visitor runs while the storage is locked for reading and must
    /// not write back into it.
    fn for_each(&self, visitor: &mut dyn FnMut(&K, &V));

    /// Number of stored entries, expired-but-unswept included.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Instant the reaper should next sweep at, None when idle.
    fn next_sweep_at(&self) -> Option<Instant>;

    /// Removes every entry expired at `now` and reschedules from the
    /// earliest surviving expiration.
    fn sweep(&self, now: Instant) -> Swept<K, V>;
}

// == Cache Store ==
/// In-process key-value cache with per-entry TTL.
///
/// Each store owns one reaper task, spawned on the current Tokio runtime
/// at construction. Clones share the same entries and reaper; the reaper
/// stops once the last clone is dropped.
///
/// # Example
/// ```no_run
/// use std::time::Duration;
/// use reap_cache::{Expiration, LockedCache};
///
/// #[tokio::main]
/// async fn main() -> reap_cache::Result<()> {
///     let cache = LockedCache::new(Duration::from_secs(60))?;
///     cache.set("session", "token", Expiration::Default);
///     assert_eq!(cache.get(&"session"), Some("token"));
///     Ok(())
/// }
/// ```
pub struct CacheStore<K, V, S = LockedMap<K, V>> {
    shared: Arc<Shared<K, V, S>>,
}

struct Shared<K, V, S> {
    storage: Arc<S>,
    default_ttl: Duration,
    wake_tx: mpsc::Sender<()>,
    listener: Arc<EvictionListener<K, V>>,
    stats: Arc<StatsRecorder>,
}

/// Store backed by a `HashMap` behind one reader-writer lock.
pub type LockedCache<K, V> = CacheStore<K, V, LockedMap<K, V>>;

/// Store backed by a sharded concurrent map and an atomic schedule.
pub type ConcurrentCache<K, V> = CacheStore<K, V, ConcurrentMap<K, V>>;

impl<K, V, S> Clone for CacheStore<K, V, S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K, V, S> CacheStore<K, V, S>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: Storage<K, V>,
{
    // == Constructor ==
    /// Creates a store whose default-expiration writes live for `default_ttl`.
    ///
    /// # Errors
    /// `CacheError::RuntimeUnavailable` when called outside a Tokio runtime.
    pub fn new(default_ttl: Duration) -> Result<Self> {
        Self::with_config(&CacheConfig::default().with_default_ttl(default_ttl))
    }

    /// Creates a store from a full configuration.
    ///
    /// # Errors
    /// `CacheError::RuntimeUnavailable` when called outside a Tokio runtime.
    pub fn with_config(config: &CacheConfig) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| CacheError::RuntimeUnavailable)?;

        let storage = Arc::new(S::default());
        let (wake_tx, wake_rx) = mpsc::channel(WAKE_CAPACITY);
        let listener = Arc::new(EvictionListener::new());
        let stats = Arc::new(StatsRecorder::new());

        spawn_reaper(
            &runtime,
            Reaper {
                name: config.name.clone(),
                storage: Arc::clone(&storage),
                wake_rx,
                listener: Arc::clone(&listener),
                stats: Arc::clone(&stats),
            },
        );

        Ok(Self {
            shared: Arc::new(Shared {
                storage,
                default_ttl: config.default_ttl,
                wake_tx,
                listener,
                stats,
            }),
        })
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Expiration is not checked here: an entry past its TTL is returned
    /// until the reaper's next sweep removes it.
    pub fn get(&self, key: &K) -> Option<V> {
        let value = self.shared.storage.get(key);
        match value {
            Some(_) => self.shared.stats.record_hit(),
            None => self.shared.stats.record_miss(),
        }
        value
    }

    // == Set ==
    /// Stores a key-value pair, overwriting any existing entry.
    pub fn set(&self, key: K, value: V, ttl: Expiration) {
        self.replace(key, value, ttl);
    }

    // == Replace ==
    /// Stores a key-value pair and returns the value it replaced.
    pub fn replace(&self, key: K, value: V, ttl: Expiration) -> Option<V> {
        let written = self.shared.storage.insert(key, self.entry(value, ttl));
        if written.rescheduled {
            self.wake();
        }
        written.previous
    }

    // == Add ==
    /// Stores a key-value pair only if the key is absent.
    ///
    /// Returns false, leaving the stored entry untouched, if the key is
    /// present. An expired entry the reaper has not swept yet counts as
    /// present.
    pub fn add(&self, key: K, value: V, ttl: Expiration) -> bool {
        match self.shared.storage.insert_if_absent(key, self.entry(value, ttl)) {
            Some(written) => {
                if written.rescheduled {
                    self.wake();
                }
                true
            }
            None => false,
        }
    }

    // == Delete ==
    /// Removes an entry by key. Returns whether it was present.
    pub fn delete(&self, key: &K) -> bool {
        self.shared.storage.remove(key).is_some()
    }

    // == Clear ==
    /// Removes every entry and sends the reaper back to idle.
    pub fn clear(&self) {
        self.shared.storage.clear();
        self.wake();
    }

    // == For Each ==
    /// Calls `visitor` once per stored pair, in unspecified order.
    ///
    /// Expired entries not yet swept are visited too. The visitor must not
    /// write into this cache.
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&K, &V),
    {
        self.shared.storage.for_each(&mut visitor);
    }

    // == Eviction Callback ==
    /// Registers a callback the reaper invokes for every entry it evicts.
    ///
    /// It runs on the reaper task after the sweep has released the storage,
    /// once per expired entry. Deletes, overwrites and `clear` do not call
    /// it. A later registration replaces the earlier one.
    pub fn set_eviction_callback<F>(&self, callback: F)
    where
        F: Fn(&K, &V) + Send + Sync + 'static,
    {
        self.shared.listener.set(Arc::new(callback));
    }

    /// Removes the eviction callback, if any.
    pub fn clear_eviction_callback(&self) {
        self.shared.listener.clear();
    }

    // == Introspection ==
    /// Returns the current number of entries, expired-but-unswept included.
    pub fn len(&self) -> usize {
        self.shared.storage.len()
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.shared.storage.is_empty()
    }

    /// TTL applied by `Expiration::Default` writes.
    pub fn default_ttl(&self) -> Duration {
        self.shared.default_ttl
    }

    /// Instant of the next scheduled sweep, None when the reaper is idle.
    pub fn next_sweep_at(&self) -> Option<Instant> {
        self.shared.storage.next_sweep_at()
    }

    /// Time left until the next scheduled sweep, None when the reaper is idle.
    pub fn next_sweep_delay(&self) -> Option<Duration> {
        self.next_sweep_at()
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.shared.stats.snapshot(self.len())
    }

    fn entry(&self, value: V, ttl: Expiration) -> CacheEntry<V> {
        CacheEntry::new(value, ttl.resolve(self.shared.default_ttl, Instant::now()))
    }

    fn wake(&self) {
        match self.shared.wake_tx.try_send(()) {
            Ok(()) => trace!("reaper woken to re-read schedule"),
            Err(TrySendError::Full(())) => trace!("reaper wake already pending"),
            Err(TrySendError::Closed(())) => {
                warn!("reaper is not running; schedule change will not be observed")
            }
        }
    }
}

impl<K, V, S> fmt::Debug for CacheStore<K, V, S>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: Storage<K, V>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("len", &self.len())
            .field("default_ttl", &self.shared.default_ttl)
            .field("next_sweep_at", &self.next_sweep_at())
            .finish()
    }
}

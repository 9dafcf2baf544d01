//! Sweep Scheduling
//!
//! The part of the expiration engine both storage strategies share: how a
//! write decides it moved the next sweep earlier, how a sweep scans the
//! entries, and the lock-free schedule cell used by `ConcurrentMap`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

use crate::cache::CacheEntry;

// == Schedule Comparison ==
/// Returns true if a sweep at `candidate` would run before `current`.
///
/// Nothing scheduled counts as later than any instant.
#[inline]
pub(crate) fn is_earlier(current: Option<Instant>, candidate: Instant) -> bool {
    current.map_or(true, |scheduled| candidate < scheduled)
}

/// Lowers `slot` to `expires_at` when that is earlier than what it holds.
///
/// Returns true if the schedule moved, meaning the reaper needs a wake.
pub(crate) fn advance(slot: &mut Option<Instant>, expires_at: Option<Instant>) -> bool {
    match expires_at {
        Some(at) if is_earlier(*slot, at) => {
            *slot = Some(at);
            true
        }
        _ => false,
    }
}

// == Sweep Plan ==
/// Accumulates the result of scanning every entry at one instant.
#[derive(Debug)]
pub(crate) struct SweepPlan<K> {
    now: Instant,
    expired: Vec<K>,
    next_sweep_at: Option<Instant>,
}

impl<K: Clone> SweepPlan<K> {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            now,
            expired: Vec::new(),
            next_sweep_at: None,
        }
    }

    /// Marks the entry for removal if expired, otherwise folds its
    /// expiration into the earliest survivor.
    pub(crate) fn observe<V>(&mut self, key: &K, entry: &CacheEntry<V>) {
        if entry.is_expired_at(self.now) {
            self.expired.push(key.clone());
        } else {
            advance(&mut self.next_sweep_at, entry.expires_at);
        }
    }

    /// Keys to remove and the instant of the next sweep.
    pub(crate) fn into_parts(self) -> (Vec<K>, Option<Instant>) {
        (self.expired, self.next_sweep_at)
    }
}

// == Atomic Schedule ==
const UNSCHEDULED: u64 = 0;

/// The next sweep instant stored in a single `AtomicU64`.
///
/// Instants are kept as nanoseconds past `epoch`, plus one, so that zero
/// can stand for "nothing scheduled" inside the cell without leaking that
/// sentinel out of this type.
#[derive(Debug)]
pub(crate) struct AtomicSchedule {
    epoch: Instant,
    slot: AtomicU64,
}

impl AtomicSchedule {
    pub(crate) fn new() -> Self {
        Self {
            epoch: Instant::now(),
            slot: AtomicU64::new(UNSCHEDULED),
        }
    }

    fn encode(&self, at: Option<Instant>) -> u64 {
        match at {
            None => UNSCHEDULED,
            Some(at) => {
                let nanos = at.saturating_duration_since(self.epoch).as_nanos();
                u64::try_from(nanos).unwrap_or(u64::MAX).saturating_add(1)
            }
        }
    }

    fn decode(&self, raw: u64) -> Option<Instant> {
        match raw {
            UNSCHEDULED => None,
            raw => self.epoch.checked_add(Duration::from_nanos(raw - 1)),
        }
    }

    pub(crate) fn load(&self) -> Option<Instant> {
        self.decode(self.slot.load(Ordering::Acquire))
    }

    /// Atomic counterpart of [`advance`].
    pub(crate) fn lower_to(&self, at: Instant) -> bool {
        let candidate = self.encode(Some(at));
        self.slot
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current == UNSCHEDULED || candidate < current).then_some(candidate)
            })
            .is_ok()
    }

    pub(crate) fn reset(&self) {
        self.slot.store(UNSCHEDULED, Ordering::Release);
    }

    /// Empties the cell at the start of a sweep.
    ///
    /// Until [`settle`](Self::settle) runs, any expiring write lowers the
    /// cell from nothing and so reports a reschedule, even when the entry
    /// lands in a part of the map the scan has already passed.
    pub(crate) fn begin_sweep(&self) {
        self.slot.swap(UNSCHEDULED, Ordering::AcqRel);
    }

    /// Publishes the schedule a sweep computed, keeping anything earlier
    /// that writers stored since [`begin_sweep`](Self::begin_sweep).
    pub(crate) fn settle(&self, computed: Option<Instant>) {
        let computed = self.encode(computed);
        let mut current = self.slot.load(Ordering::Acquire);
        loop {
            let merged = earliest(current, computed);
            if merged == current {
                return;
            }
            match self.slot.compare_exchange_weak(
                current,
                merged,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

fn earliest(a: u64, b: u64) -> u64 {
    match (a, b) {
        (UNSCHEDULED, other) | (other, UNSCHEDULED) => other,
        (a, b) => a.min(b),
    }
}

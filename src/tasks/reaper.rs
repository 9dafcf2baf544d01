//! Expiration Reaper
//!
//! Background task that removes expired entries from one store.
//!
//! The reaper never polls. While nothing can expire it waits only for a
//! wake signal (Idle). Once a sweep is scheduled it races a timer set for
//! that instant against the wake signal (Armed). A wake means a writer moved
//! the schedule, so the reaper re-reads it and re-arms; the timer firing
//! means it is time to sweep. Every sweep reschedules from the earliest
//! surviving expiration.

use std::hash::Hash;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace};

use crate::cache::eviction::EvictionListener;
use crate::cache::stats::StatsRecorder;
use crate::cache::Storage;

/// Everything a reaper owns. The store keeps the matching wake sender.
pub(crate) struct Reaper<K, V, S> {
    /// Label for log lines
    pub name: String,
    pub storage: Arc<S>,
    /// Closed once every handle to the store is dropped
    pub wake_rx: mpsc::Receiver<()>,
    pub listener: Arc<EvictionListener<K, V>>,
    pub stats: Arc<StatsRecorder>,
}

enum Event {
    SweepDue,
    Rescheduled,
    StoreDropped,
}

/// Spawns the reaper on `runtime`.
///
/// The task runs until the wake channel closes, which happens when the last
/// store handle holding the sender is dropped.
pub(crate) fn spawn_reaper<K, V, S>(runtime: &Handle, reaper: Reaper<K, V, S>) -> JoinHandle<()>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: Storage<K, V>,
{
    runtime.spawn(reaper.run())
}

impl<K, V, S> Reaper<K, V, S>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: Storage<K, V>,
{
    async fn run(mut self) {
        info!(cache = %self.name, "Starting reaper");

        loop {
            match self.next_event().await {
                Event::SweepDue => self.sweep(),
                Event::Rescheduled => trace!(cache = %self.name, "Reaper woken, re-reading schedule"),
                Event::StoreDropped => break,
            }
        }

        info!(cache = %self.name, "Reaper stopped: store dropped");
    }

    async fn next_event(&mut self) -> Event {
        let wake = |signal: Option<()>| match signal {
            Some(()) => Event::Rescheduled,
            None => Event::StoreDropped,
        };

        match self.storage.next_sweep_at() {
            None => wake(self.wake_rx.recv().await),
            Some(at) => tokio::select! {
                _ = sleep_until(at) => Event::SweepDue,
                signal = self.wake_rx.recv() => wake(signal),
            },
        }
    }

    fn sweep(&self) {
        let now = Instant::now();
        let swept = self.storage.sweep(now);
        let evicted = swept.evicted.len();
        let next_sweep_in = swept
            .next_sweep_at
            .map(|at| at.saturating_duration_since(now));

        self.stats.record_sweep(evicted);

        if evicted > 0 {
            debug!(
                cache = %self.name,
                evicted,
                remaining = self.storage.len(),
                next_sweep_in = ?next_sweep_in,
                "Reaper swept expired entries"
            );
        } else {
            trace!(cache = %self.name, next_sweep_in = ?next_sweep_in, "Reaper sweep found nothing expired");
        }

        self.listener.notify(&swept.evicted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::cache::{CacheEntry, LockedMap};

    type Map = LockedMap<&'static str, i32>;

    struct Harness {
        storage: Arc<Map>,
        wake_tx: mpsc::Sender<()>,
        stats: Arc<StatsRecorder>,
        handle: JoinHandle<()>,
    }

    fn start() -> Harness {
        let storage = Arc::new(Map::default());
        let stats = Arc::new(StatsRecorder::new());
        let (wake_tx, wake_rx) = mpsc::channel(1);
        let handle = spawn_reaper(
            &Handle::current(),
            Reaper {
                name: "test".to_string(),
                storage: Arc::clone(&storage),
                wake_rx,
                listener: Arc::new(EvictionListener::new()),
                stats: Arc::clone(&stats),
            },
        );
        Harness {
            storage,
            wake_tx,
            stats,
            handle,
        }
    }

    impl Harness {
        fn insert(&self, key: &'static str, ttl: Option<Duration>) {
            let entry = CacheEntry::new(1, ttl.map(|ttl| Instant::now() + ttl));
            if self.storage.insert(key, entry).rescheduled {
                let _ = self.wake_tx.try_send(());
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_sweeps_at_scheduled_instant() {
        let harness = start();
        harness.insert("short", Some(Duration::from_secs(1)));
        harness.insert("forever", None);

        tokio::time::sleep(Duration::from_millis(900)).await;
        assert_eq!(harness.storage.len(), 2);
        assert_eq!(harness.stats.snapshot(0).sweeps, 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(harness.storage.len(), 1);
        assert_eq!(harness.storage.next_sweep_at(), None);

        let stats = harness.stats.snapshot(0);
        assert_eq!(stats.sweeps, 1);
        assert_eq!(stats.evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_reaper_never_sweeps() {
        let harness = start();
        harness.insert("forever", None);

        tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
        assert_eq!(harness.stats.snapshot(0).sweeps, 0);
        assert_eq!(harness.storage.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_rearms_for_sooner_expiration() {
        let harness = start();
        harness.insert("long", Some(Duration::from_secs(3600)));
        tokio::time::sleep(Duration::from_secs(1)).await;

        harness.insert("short", Some(Duration::from_secs(1)));
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(harness.storage.get(&"short"), None);
        assert_eq!(harness.storage.get(&"long"), Some(1));
        assert_eq!(harness.stats.snapshot(0).sweeps, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_chains_sweeps_through_survivors() {
        let harness = start();
        harness.insert("first", Some(Duration::from_secs(1)));
        harness.insert("second", Some(Duration::from_secs(5)));
        harness.insert("third", Some(Duration::from_secs(10)));

        tokio::time::sleep(Duration::from_secs(11)).await;

        assert!(harness.storage.is_empty());
        let stats = harness.stats.snapshot(0);
        assert_eq!(stats.sweeps, 3);
        assert_eq!(stats.evictions, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_stops_when_idle_store_dropped() {
        let harness = start();
        drop(harness.wake_tx);

        let finished = tokio::time::timeout(Duration::from_secs(1), harness.handle).await;
        assert!(finished.is_ok(), "Reaper should exit once the wake channel closes");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_stops_when_armed_store_dropped() {
        let harness = start();
        harness.insert("long", Some(Duration::from_secs(3600)));
        tokio::task::yield_now().await;
        drop(harness.wake_tx);

        let finished = tokio::time::timeout(Duration::from_secs(1), harness.handle).await;
        assert!(finished.is_ok(), "Reaper should exit without waiting for its timer");
        assert_eq!(harness.storage.len(), 1);
    }
}

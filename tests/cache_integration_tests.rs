//! Integration Tests for the Cache
//!
//! Exercises both strategies through the public API on real runtimes and
//! real time: concurrent writers, eventual eviction, the eviction callback
//! and reaper shutdown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reap_cache::{
    CacheConfig, CacheStore, ConcurrentMap, Expiration, LockedMap, Storage,
};
use tracing_subscriber::EnvFilter;

// == Helper Functions ==

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "reap_cache=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

const WRITERS: usize = 8;
const KEYS_PER_WRITER: usize = 240;

/// Polls `check` until it holds or `limit` elapses.
async fn eventually<F>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Writers on plain OS threads set distinct keys with varying TTLs; none may
/// be lost, and the short-lived ones must eventually be swept.
async fn concurrent_writers_never_lose_entries<S>()
where
    S: Storage<String, usize>,
{
    init_tracing();
    let config = CacheConfig::default()
        .with_default_ttl(Duration::from_secs(600))
        .with_name("concurrent-writers");
    let cache = CacheStore::<String, usize, S>::with_config(&config).unwrap();

    std::thread::scope(|scope| {
        for writer in 0..WRITERS {
            let cache = cache.clone();
            scope.spawn(move || {
                for i in 0..KEYS_PER_WRITER {
                    let ttl = match i % 4 {
                        0 => Expiration::Never,
                        1 => Expiration::Default,
                        2 => Expiration::After(Duration::from_secs(300 + i as u64)),
                        _ => Expiration::After(Duration::from_millis(50 + (i % 7) as u64 * 10)),
                    };
                    cache.set(format!("w{writer}-k{i}"), writer * KEYS_PER_WRITER + i, ttl);
                }
            });
        }
    });

    for writer in 0..WRITERS {
        for i in (0..KEYS_PER_WRITER).filter(|i| i % 4 != 3) {
            assert_eq!(
                cache.get(&format!("w{writer}-k{i}")),
                Some(writer * KEYS_PER_WRITER + i),
                "long-lived key w{writer}-k{i} was lost"
            );
        }
    }

    let long_lived = WRITERS * KEYS_PER_WRITER * 3 / 4;
    assert!(
        eventually(Duration::from_secs(5), || cache.len() == long_lived).await,
        "short-lived keys were not swept: {} entries left",
        cache.len()
    );
    assert!(cache.next_sweep_at().is_some());
    assert!(cache.stats().evictions >= (WRITERS * KEYS_PER_WRITER / 4) as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_locked_concurrent_writers() {
    concurrent_writers_never_lose_entries::<LockedMap<String, usize>>().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_map_concurrent_writers() {
    concurrent_writers_never_lose_entries::<ConcurrentMap<String, usize>>().await;
}

/// Concurrent `add` calls for the same keys: exactly one wins per key.
async fn racing_adds_have_one_winner<S>()
where
    S: Storage<String, usize>,
{
    init_tracing();
    let cache = CacheStore::<String, usize, S>::new(Duration::from_secs(60)).unwrap();
    let wins = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let cache = cache.clone();
            let wins = Arc::clone(&wins);
            tokio::spawn(async move {
                for i in 0..100 {
                    if cache.add(format!("k{i}"), writer, Expiration::Default) {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(wins.load(Ordering::SeqCst), 100);
    assert_eq!(cache.len(), 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_locked_racing_adds() {
    racing_adds_have_one_winner::<LockedMap<String, usize>>().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_map_racing_adds() {
    racing_adds_have_one_winner::<ConcurrentMap<String, usize>>().await;
}

#[tokio::test]
async fn test_eviction_callback_in_real_time() {
    init_tracing();
    let cache = CacheStore::<String, usize, ConcurrentMap<String, usize>>::new(
        Duration::from_millis(50),
    )
    .unwrap();
    let evicted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&evicted);
    cache.set_eviction_callback(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    for i in 0..10 {
        cache.set(format!("k{i}"), i, Expiration::Default);
    }
    cache.set("kept".to_string(), 99, Expiration::Never);

    assert!(eventually(Duration::from_secs(5), || evicted.load(Ordering::SeqCst) == 10).await);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get(&"kept".to_string()), Some(99));
    assert_eq!(cache.next_sweep_at(), None);
}

#[tokio::test]
async fn test_dropping_last_handle_stops_reaper() {
    init_tracing();
    let cache = CacheStore::<String, usize, LockedMap<String, usize>>::new(
        Duration::from_secs(3600),
    )
    .unwrap();
    cache.set("armed".to_string(), 1, Expiration::Default);

    // The callback is owned by the reaper too, so its strong count shows
    // when the reaper has let go.
    let token = Arc::new(());
    let held = Arc::clone(&token);
    cache.set_eviction_callback(move |_, _| {
        let _ = Arc::strong_count(&held);
    });

    let clone = cache.clone();
    drop(cache);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(Arc::strong_count(&token), 2, "a live clone keeps the reaper running");

    drop(clone);
    assert!(
        eventually(Duration::from_secs(5), || Arc::strong_count(&token) == 1).await,
        "reaper should release the store once the last handle is dropped"
    );
}

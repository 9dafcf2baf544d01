//! Eviction Callback
//!
//! Holds the optional callback the reaper calls for each entry it sweeps.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::error;

/// Callback invoked with each key-value pair the reaper evicts.
pub type EvictionCallback<K, V> = Arc<dyn Fn(&K, &V) + Send + Sync>;

pub(crate) struct EvictionListener<K, V> {
    callback: RwLock<Option<EvictionCallback<K, V>>>,
}

impl<K, V> EvictionListener<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            callback: RwLock::new(None),
        }
    }

    pub(crate) fn set(&self, callback: EvictionCallback<K, V>) {
        *self.callback.write() = Some(callback);
    }

    pub(crate) fn clear(&self) {
        *self.callback.write() = None;
    }

    /// Calls the registered callback once per evicted pair.
    ///
    /// The callback is cloned out first so it never runs under the lock and
    /// may itself register a replacement. A panic inside the callback is
    /// logged and swallowed; the remaining pairs are still delivered.
    pub(crate) fn notify(&self, evicted: &[(K, V)]) {
        if evicted.is_empty() {
            return;
        }
        let callback = self.callback.read().clone();
        if let Some(callback) = callback {
            for (key, value) in evicted {
                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(key, value))) {
                    error!(panic = panic_message(&*payload), "Eviction callback panicked");
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

//! Cache Module
//!
//! Provides in-memory caching with per-entry TTL and a self-scheduling
//! reaper, over two interchangeable storage strategies.

mod concurrent;
mod entry;
pub(crate) mod eviction;
mod expiration;
mod locked;
pub(crate) mod schedule;
pub(crate) mod stats;
mod store;


// Re-export public types
pub use concurrent::ConcurrentMap;
pub use entry::CacheEntry;
pub use eviction::EvictionCallback;
pub use expiration::Expiration;
pub use locked::LockedMap;
pub use stats::CacheStats;
pub use store::{CacheStore, ConcurrentCache, LockedCache, Storage, Swept, Written};

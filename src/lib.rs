//! Reap Cache - an in-process key-value cache with per-entry TTL
//!
//! Entries expire by time only. Each store runs one background reaper that
//! sleeps until the earliest scheduled expiration, removes what has expired,
//! and reschedules itself; writers that introduce an earlier expiration wake
//! it to re-arm.

pub mod cache;
pub mod config;
pub mod error;
mod tasks;

pub use cache::{
    CacheEntry, CacheStats, CacheStore, ConcurrentCache, ConcurrentMap, EvictionCallback,
    Expiration, LockedCache, LockedMap, Storage,
};
pub use config::CacheConfig;
pub use error::{CacheError, Result};

//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use tokio::time::Instant;

// == Cache Entry ==
/// Represents a single cache entry with its value and expiration instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// Absolute expiration instant, None = never expires
    pub expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new cache entry expiring at `expires_at`.
    pub fn new(value: V, expires_at: Option<Instant>) -> Self {
        Self { value, expires_at }
    }

    // == Is Expired ==
    /// Checks if the entry has expired as of `now`.
    ///
    /// Boundary condition: an entry is expired once `now` reaches its
    /// expiration instant, so a sweep that fires exactly on schedule
    /// removes it.
    ///
    /// # Returns
    /// - `true` if the entry has an expiration and `now >= expires_at`
    /// - `false` if the entry never expires or has not reached it yet
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

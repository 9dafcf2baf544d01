//! Expiration Requests
//!
//! The TTL a writer asks for, kept apart from any concrete duration so
//! "never" and "use the store default" cannot be confused with a real TTL.

use std::time::Duration;

use tokio::time::Instant;

/// How long a written entry should live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Expiration {
    /// The entry lives until it is deleted, overwritten or cleared
    Never,
    /// Use the store's configured default TTL
    #[default]
    Default,
    /// Expire this long after the write
    After(Duration),
}

impl Expiration {
    /// Resolves the request into an absolute expiration instant.
    ///
    /// An instant too far away for the clock to represent is treated as
    /// never expiring.
    pub fn resolve(self, default_ttl: Duration, now: Instant) -> Option<Instant> {
        match self {
            Expiration::Never => None,
            Expiration::Default => now.checked_add(default_ttl),
            Expiration::After(ttl) => now.checked_add(ttl),
        }
    }
}

impl From<Duration> for Expiration {
    fn from(ttl: Duration) -> Self {
        Expiration::After(ttl)
    }
}

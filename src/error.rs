//! Error types for the cache
//!
//! Provides unified error handling using thiserror. Cache operations
//! themselves never fail; errors only arise while building a store.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The store was built outside a Tokio runtime, so its reaper cannot be spawned
    #[error("no Tokio runtime available to spawn the reaper task")]
    RuntimeUnavailable,

    /// A configuration value could not be parsed
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            CacheError::RuntimeUnavailable.to_string(),
            "no Tokio runtime available to spawn the reaper task"
        );
        assert_eq!(
            CacheError::InvalidConfig("CACHE_DEFAULT_TTL=abc".to_string()).to_string(),
            "Invalid configuration: CACHE_DEFAULT_TTL=abc"
        );
    }
}

//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::time::Duration;

use crate::error::{CacheError, Result};

/// Default TTL applied by `Expiration::Default` writes, in seconds
pub const DEFAULT_TTL_SECS: u64 = 300;

/// Default label attached to a store's reaper log lines
pub const DEFAULT_NAME: &str = "cache";

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// TTL used when a write asks for the default expiration
    pub default_ttl: Duration,
    /// Label used in the reaper's log lines
    pub name: String,
}

impl CacheConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DEFAULT_TTL` - Default TTL in seconds (default: 300)
    /// - `CACHE_NAME` - Label for log lines (default: "cache")
    ///
    /// Unset variables fall back to their default. A variable that is set
    /// but cannot be parsed is reported as `CacheError::InvalidConfig`.
    pub fn from_env() -> Result<Self> {
        let default_ttl = match env::var("CACHE_DEFAULT_TTL") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| CacheError::InvalidConfig(format!("CACHE_DEFAULT_TTL={raw}")))?,
            Err(_) => Duration::from_secs(DEFAULT_TTL_SECS),
        };

        let name = env::var("CACHE_NAME").unwrap_or_else(|_| DEFAULT_NAME.to_string());

        Ok(Self { default_ttl, name })
    }

    /// Sets the TTL applied by default-expiration writes.
    pub fn with_default_ttl(mut self, default_ttl: Duration) -> Self {
        self.default_ttl = default_ttl;
        self
    }

    /// Sets the label used in log lines.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            name: DEFAULT_NAME.to_string(),
        }
    }
}

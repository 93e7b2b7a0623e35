//! Cache configuration
//!
//! All tunables are resolved once, at construction time, into an explicit
//! [`CacheConfig`] that is handed to each tier. Environment overrides are
//! read by [`CacheConfig::from_env`] rather than lazily on every call.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default TTL for general-purpose memoization, in seconds.
pub const DEFAULT_TTL_SECS: u64 = 3600;

/// Default TTL for provider-request memoization, in seconds.
///
/// Provider listings churn quickly, so the orchestrator keeps responses in
/// memory for a much shorter window than the general default.
pub const REQUEST_TTL_SECS: u64 = 300;

/// Default capacity of the memory tier, in entries.
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Environment variable overriding the memory-tier TTL, in seconds.
pub const ENV_TTL_SECS: &str = "JOBCACHE_TTL_SECS";

/// Environment variable overriding the memory-tier capacity.
pub const ENV_MAX_ENTRIES: &str = "JOBCACHE_MAX_ENTRIES";

/// Environment variable overriding the file-tier cache directory.
pub const ENV_CACHE_DIR: &str = "JOBCACHE_DIR";

/// Configuration for both cache tiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum age of a memory-tier entry before it is treated as a miss
    pub ttl: Duration,
    /// Maximum number of memory-tier entries before LRU eviction kicks in
    pub max_entries: usize,
    /// File-tier directory; `None` selects the XDG cache directory
    pub cache_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            max_entries: DEFAULT_MAX_ENTRIES,
            cache_dir: None,
        }
    }
}

impl CacheConfig {
    /// Configuration tuned for provider-request memoization (short TTL).
    ///
    /// This is what [`crate::CachedClient`] is normally constructed with.
    pub fn for_requests() -> Self {
        Self {
            ttl: Duration::from_secs(REQUEST_TTL_SECS),
            ..Self::default()
        }
    }

    /// Builds a configuration from the environment, falling back to the
    /// request-memoization defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self::for_requests();
        if let Some(secs) = env_u64(ENV_TTL_SECS) {
            config.ttl = Duration::from_secs(secs);
        }
        if let Some(entries) = env_u64(ENV_MAX_ENTRIES) {
            config.max_entries = entries as usize;
        }
        if let Ok(dir) = env::var(ENV_CACHE_DIR) {
            if !dir.is_empty() {
                config.cache_dir = Some(PathBuf::from(dir));
            }
        }
        config
    }

    /// Overrides the file-tier directory.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }
}

fn env_u64(name: &str) -> Option<u64> {
    env::var(name).ok()?.trim().parse().ok()
}

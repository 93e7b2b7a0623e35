//! Cache orchestrator
//!
//! Walks the tiers for every request: memory, then disk, then the origin
//! fetch, writing through to both tiers on a successful fetch. Tier failures
//! are isolated - a broken memory tier degrades to the file tier, a broken
//! file tier degrades to the origin, and an unreachable origin degrades to
//! the empty-response sentinel. The caller never sees an error from here.

use std::future::Future;
use std::sync::Mutex;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::config::CacheConfig;
use crate::fingerprint::fingerprint;
use crate::memory::{MemoryCache, MemoryStats};
use crate::response::Listings;
use crate::store::{CacheStatus, FileCache};
use crate::Params;

/// Errors an origin fetch can report.
///
/// These never propagate past the orchestrator; they exist so failures can
/// be logged with their cause before the sentinel is substituted.
#[derive(Debug, Error)]
pub enum OriginError {
    /// Could not reach the provider
    #[error("connection to provider failed: {0}")]
    Connection(String),

    /// The provider did not answer in time
    #[error("provider request timed out")]
    Timeout,

    /// Anything else the provider client reports
    #[error("provider error: {0}")]
    Provider(String),
}

/// The origin fetch the orchestrator falls back to when both tiers miss.
///
/// Implementations are the actual provider HTTP clients; the cache does not
/// care about their wire protocol, only that they produce a [`Listings`]
/// payload or an [`OriginError`].
pub trait Origin {
    /// Fetches a page of listings from the provider.
    fn fetch(
        &self,
        url: &str,
        params: &Params,
    ) -> impl Future<Output = Result<Listings, OriginError>> + Send;
}

/// Combined diagnostics for both tiers, keyed to one source.
#[derive(Debug, Clone, Serialize)]
pub struct CacheDiagnostics {
    /// File-tier diagnostics
    pub files: CacheStatus,
    /// Memory-tier stats; `None` when the tier is unavailable
    pub memory: Option<MemoryStats>,
}

/// Memory-tier key: the full call signature of a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RequestKey {
    source: String,
    url: String,
    fingerprint: String,
}

/// A provider client wrapped in the two cache tiers.
///
/// The memory table sits behind a mutex so concurrent callers are safe;
/// concurrent misses on the same request are not coalesced, so N callers
/// missing together will perform N origin fetches (the writes are idempotent
/// overwrites of the same record, so this wastes work but stays correct).
pub struct CachedClient<O> {
    origin: O,
    memory: Mutex<MemoryCache<RequestKey, Listings>>,
    files: FileCache,
}

impl<O: Origin> CachedClient<O> {
    /// Wraps an origin client using the given configuration.
    ///
    /// Returns `None` only when no cache directory is configured and the
    /// XDG default cannot be determined.
    pub fn new(origin: O, config: &CacheConfig) -> Option<Self> {
        let files = match &config.cache_dir {
            Some(dir) => FileCache::with_dir(dir.clone()),
            None => FileCache::new()?,
        };
        Some(Self::with_file_cache(origin, files, config))
    }

    /// Wraps an origin client around an existing file cache.
    pub fn with_file_cache(origin: O, files: FileCache, config: &CacheConfig) -> Self {
        Self {
            origin,
            memory: Mutex::new(MemoryCache::new(config.ttl, config.max_entries)),
            files,
        }
    }

    /// Fetches a page of listings, consulting memory, then disk, then the
    /// origin.
    ///
    /// This never fails: an origin error is logged and replaced by
    /// [`Listings::empty`]. A successful non-empty fetch is written through
    /// to the file tier (subject to its validity policy) and the memory tier
    /// before being returned.
    pub async fn fetch(&self, source: &str, url: &str, params: &Params) -> Listings {
        let key = RequestKey {
            source: source.to_string(),
            url: url.to_string(),
            fingerprint: fingerprint(params),
        };

        match self.memory.lock() {
            Ok(mut memory) => {
                if let Some(hit) = memory.get(&key) {
                    debug!(source, "memory cache hit");
                    return hit;
                }
            }
            Err(err) => {
                warn!(source, %err, "memory tier unavailable, falling back to file cache");
            }
        }

        if let Some(record) = self.files.load(source, params) {
            return record.data;
        }

        match self.origin.fetch(url, params).await {
            Ok(payload) => {
                if payload.is_empty() {
                    debug!(source, "origin returned no results, nothing to cache");
                    return payload;
                }
                debug!(source, found = payload.found, "origin fetch succeeded");
                self.files.save(source, params, &payload);
                match self.memory.lock() {
                    Ok(mut memory) => memory.insert(key, payload.clone()),
                    Err(err) => warn!(source, %err, "memory tier unavailable, skipping population"),
                }
                payload
            }
            Err(err) => {
                error!(source, %err, "origin fetch failed, returning empty response");
                Listings::empty()
            }
        }
    }

    /// Clears cached records for one source, or everything when `source` is
    /// `None`. The memory tier is emptied either way (its keys are not
    /// enumerable by prefix). Returns the number of files removed.
    pub fn clear_cache(&self, source: Option<&str>) -> usize {
        let removed = self.files.clear(source);
        match self.memory.lock() {
            Ok(mut memory) => memory.clear(),
            Err(err) => warn!(%err, "memory tier unavailable, skipping clear"),
        }
        removed
    }

    /// Diagnostics for one source: file-tier analysis plus memory stats.
    pub fn cache_status(&self, source: &str) -> CacheDiagnostics {
        CacheDiagnostics {
            files: self.files.status(source),
            memory: self.memory.lock().ok().map(|memory| memory.stats()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn params_from(pairs: &[(&str, Value)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn listings(ids: &[&str], found: u64) -> Listings {
        Listings {
            items: ids
                .iter()
                .map(|id| json!({ "id": id, "name": format!("Vacancy {id}") }))
                .collect(),
            found,
            pages: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Origin stub that always answers with the same payload and counts calls.
    struct FixedOrigin {
        payload: Listings,
        calls: AtomicUsize,
    }

    impl FixedOrigin {
        fn new(payload: Listings) -> Self {
            Self {
                payload,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Origin for FixedOrigin {
        async fn fetch(&self, _url: &str, _params: &Params) -> Result<Listings, OriginError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.payload.clone())
        }
    }

    /// Origin stub that always fails with a connection error.
    struct DownOrigin {
        calls: AtomicUsize,
    }

    impl DownOrigin {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Origin for DownOrigin {
        async fn fetch(&self, _url: &str, _params: &Params) -> Result<Listings, OriginError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(OriginError::Connection("connection refused".to_string()))
        }
    }

    fn test_client<O: Origin>(origin: O, dir: &TempDir) -> CachedClient<O> {
        let files = FileCache::with_dir(dir.path().to_path_buf());
        CachedClient::with_file_cache(origin, files, &CacheConfig::for_requests())
    }

    /// Poisons the client's memory mutex by panicking while holding the lock.
    fn poison_memory<O>(client: &CachedClient<O>) {
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let _guard = client.memory.lock().expect("lock should be clean");
            panic!("poison the memory tier");
        }));
        assert!(result.is_err());
        assert!(client.memory.lock().is_err(), "mutex should now be poisoned");
    }

    #[tokio::test]
    async fn test_miss_fetches_origin_and_populates_both_tiers() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let payload = listings(&["1", "2"], 2);
        let client = test_client(FixedOrigin::new(payload.clone()), &temp_dir);
        let params = params_from(&[("text", json!("rust")), ("page", json!(0))]);

        let first = client.fetch("hh", "https://api.hh.ru/vacancies", &params).await;
        assert_eq!(first, payload);
        assert_eq!(client.origin.calls(), 1);

        // Second call must be served from memory, not the origin.
        let second = client.fetch("hh", "https://api.hh.ru/vacancies", &params).await;
        assert_eq!(second, payload);
        assert_eq!(client.origin.calls(), 1, "memory hit should skip the origin");

        // The file tier was populated too.
        let record = client.files.load("hh", &params).expect("record should exist");
        assert_eq!(record.data, payload);
    }

    #[tokio::test]
    async fn test_origin_failure_returns_empty_sentinel() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let client = test_client(DownOrigin::new(), &temp_dir);
        let params = params_from(&[("text", json!("rust"))]);

        let payload = client.fetch("hh", "https://api.hh.ru/vacancies", &params).await;
        assert_eq!(payload, Listings::empty());
        assert!(client.files.load("hh", &params).is_none(), "nothing persisted");
    }

    #[tokio::test]
    async fn test_empty_origin_response_is_returned_but_not_cached() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let client = test_client(FixedOrigin::new(Listings::empty()), &temp_dir);
        let params = params_from(&[("text", json!("nothing")), ("page", json!(0))]);

        let first = client.fetch("hh", "https://api.hh.ru/vacancies", &params).await;
        assert!(first.is_empty());

        // No tier was populated, so the origin is consulted again.
        client.fetch("hh", "https://api.hh.ru/vacancies", &params).await;
        assert_eq!(client.origin.calls(), 2);
        assert!(client.files.load("hh", &params).is_none());
    }

    #[tokio::test]
    async fn test_file_tier_hit_skips_origin() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let payload = listings(&["7"], 1);
        let params = params_from(&[("text", json!("rust")), ("page", json!(0))]);

        // Seed the file tier as if written by an earlier process run.
        FileCache::with_dir(temp_dir.path().to_path_buf()).save("hh", &params, &payload);

        let client = test_client(DownOrigin::new(), &temp_dir);
        let result = client.fetch("hh", "https://api.hh.ru/vacancies", &params).await;
        assert_eq!(result, payload);
        assert_eq!(client.origin.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_poisoned_memory_tier_falls_through_to_file_tier() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let payload = listings(&["9"], 1);
        let params = params_from(&[("text", json!("rust")), ("page", json!(0))]);

        FileCache::with_dir(temp_dir.path().to_path_buf()).save("hh", &params, &payload);

        let client = test_client(DownOrigin::new(), &temp_dir);
        poison_memory(&client);

        let result = client.fetch("hh", "https://api.hh.ru/vacancies", &params).await;
        assert_eq!(result, payload, "file tier must still serve the payload");
    }

    #[tokio::test]
    async fn test_poisoned_memory_tier_still_reaches_origin() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let payload = listings(&["3"], 1);
        let client = test_client(FixedOrigin::new(payload.clone()), &temp_dir);
        let params = params_from(&[("text", json!("rust")), ("page", json!(0))]);

        poison_memory(&client);

        let result = client.fetch("hh", "https://api.hh.ru/vacancies", &params).await;
        assert_eq!(result, payload);
        assert_eq!(client.origin.calls(), 1);
    }

    #[tokio::test]
    async fn test_clear_cache_scopes_by_source_and_resets_memory() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let client = test_client(FixedOrigin::new(listings(&["1"], 1)), &temp_dir);
        let params = params_from(&[("text", json!("rust")), ("page", json!(0))]);

        client.fetch("hh", "https://api.hh.ru/vacancies", &params).await;
        client.fetch("sj", "https://api.superjob.ru/vacancies", &params).await;
        assert_eq!(client.cache_status("hh").memory.map(|m| m.size), Some(2));

        let removed = client.clear_cache(Some("hh"));
        assert_eq!(removed, 1, "only hh records should be deleted");
        assert!(client.files.load("sj", &params).is_some());

        // Memory is emptied wholesale, so the next hh fetch goes to the origin.
        let calls_before = client.origin.calls();
        client.fetch("hh", "https://api.hh.ru/vacancies", &params).await;
        assert_eq!(client.origin.calls(), calls_before + 1);
    }

    #[tokio::test]
    async fn test_cache_status_combines_both_tiers() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let client = test_client(FixedOrigin::new(listings(&["1"], 1)), &temp_dir);
        let params = params_from(&[("text", json!("rust")), ("page", json!(0))]);

        client.fetch("hh", "https://api.hh.ru/vacancies", &params).await;

        let diagnostics = client.cache_status("hh");
        assert_eq!(diagnostics.files.file_count, 1);
        assert_eq!(diagnostics.files.valid_files, 1);
        let memory = diagnostics.memory.expect("memory tier should be healthy");
        assert_eq!(memory.size, 1);

        poison_memory(&client);
        let diagnostics = client.cache_status("hh");
        assert!(diagnostics.memory.is_none(), "poisoned tier reports no stats");
    }
}

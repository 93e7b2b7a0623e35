//! jobcache - Multi-tier response cache for job-board API clients
//!
//! This library sits between an application and its remote job-listing
//! providers (HeadHunter, SuperJob, and the like) and memoizes provider
//! responses across two tiers:
//!
//! - a bounded in-memory tier with TTL expiry and least-recently-used
//!   eviction ([`MemoryCache`]),
//! - an on-disk tier storing one JSON record per request, keyed by
//!   `{source}_{fingerprint}.json`, with payload validation, cross-record
//!   deduplication, and self-healing deletion of corrupt files
//!   ([`FileCache`]).
//!
//! [`CachedClient`] orchestrates the tiers: memory first, then disk, then
//! the origin fetch, writing through on success. From the caller's point of
//! view it never fails; a broken tier degrades to the next one, and an
//! unreachable provider yields [`Listings::empty`] rather than an error.

pub mod client;
pub mod config;
pub mod fingerprint;
pub mod memory;
pub mod response;
pub mod store;

pub use client::{CacheDiagnostics, CachedClient, Origin, OriginError};
pub use config::CacheConfig;
pub use fingerprint::fingerprint;
pub use memory::{MemoryCache, MemoryStats};
pub use response::Listings;
pub use store::{CacheRecord, CacheStatus, FileCache, RecordMeta};

/// Request parameters as sent to a provider API.
///
/// Values are expected to be simple scalars (strings, numbers, booleans) or
/// lists of scalars. The ordered map makes key order canonical by
/// construction, so two parameter sets built in different insertion orders
/// compare equal and fingerprint identically.
pub type Params = std::collections::BTreeMap<String, serde_json::Value>;

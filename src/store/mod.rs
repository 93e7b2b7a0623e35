//! File-backed cache tier
//!
//! This module persists provider responses as individual JSON records keyed
//! by source prefix and request fingerprint. Records are validated before
//! writing, deduplicated against previously cached items for the same
//! source, and deleted on read when found truncated or corrupt so that
//! subsequent lookups are clean misses.

mod file;

pub use file::{CacheRecord, CacheStatus, FileCache, RecordMeta};

//! Provider response payload
//!
//! The cache reasons about provider responses through a minimal shape: an
//! ordered list of listing items plus the metadata counters every job board
//! reports. Anything else the provider sends is preserved verbatim in
//! `extra` so a cached response round-trips losslessly.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Params;

/// Items expected per page when the request does not say otherwise.
const DEFAULT_PER_PAGE: u64 = 20;

/// How many items the validity check samples for structural sanity.
const SAMPLE_SIZE: usize = 3;

/// A page of job listings as returned by a provider API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listings {
    /// The listings on this page, in provider order
    #[serde(default)]
    pub items: Vec<Value>,
    /// Total number of listings the provider reports for the query
    #[serde(default)]
    pub found: u64,
    /// Number of result pages, when the provider reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<u64>,
    /// Provider metadata the cache does not model, preserved as-is
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Listings {
    /// The empty-response sentinel: what callers receive when the origin is
    /// unreachable and both cache tiers miss.
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            found: 0,
            pages: None,
            extra: Map::new(),
        }
    }

    /// Whether this payload carries no results (sentinel-equivalent).
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.found == 0
    }

    /// Whether this payload is trustworthy enough to persist for the request
    /// that produced it.
    ///
    /// A page past the first with no items, or a first page whose item list
    /// contradicts the reported `found` count, is the signature of a
    /// truncated or interrupted provider response and must not poison the
    /// cache. An empty first page with `found == 0` is a legitimate
    /// "no results" answer and stays cacheable.
    pub fn is_cacheable(&self, params: &Params) -> bool {
        let page = param_u64(params, "page").unwrap_or(0);
        let per_page = param_u64(params, "per_page").unwrap_or(DEFAULT_PER_PAGE);

        if self.items.is_empty() && page > 0 {
            return false;
        }
        if page == 0 && self.found > 0 && self.items.is_empty() {
            return false;
        }
        if page == 0 && self.found > per_page && (self.items.len() as u64) < per_page {
            return false;
        }

        // Listings are JSON objects on every provider; spot-check a few.
        self.items.iter().take(SAMPLE_SIZE).all(Value::is_object)
    }
}

/// Reads a numeric request parameter, accepting both `1` and `"1"` since
/// callers routinely stringify query parameters.
pub(crate) fn param_u64(params: &Params, key: &str) -> Option<u64> {
    match params.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

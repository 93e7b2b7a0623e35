//! File cache implementation
//!
//! One JSON document per cached response, named `{source}_{fingerprint}.json`
//! inside a single cache directory. The tier never returns errors for
//! ordinary I/O failures: a failed write is a logged no-op, a failed read is
//! a logged miss, and a corrupt or truncated record is deleted on sight.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Utc;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::fingerprint::fingerprint;
use crate::response::Listings;
use crate::Params;

/// Files smaller than this cannot hold a real record and are treated as
/// truncated writes.
const MIN_RECORD_BYTES: u64 = 50;

/// How many popular query values [`FileCache::status`] reports.
const TOP_QUERIES: usize = 5;

/// A persisted cache record: when it was captured, what was asked, and what
/// the provider answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Capture time, epoch seconds
    pub timestamp: i64,
    /// The request that produced the payload
    pub meta: RecordMeta,
    /// The cached response payload
    pub data: Listings,
}

/// Request metadata stored alongside the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMeta {
    /// Original request parameters
    pub params: Params,
}

/// Diagnostics for one source's slice of the cache directory.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStatus {
    /// Directory the records live in
    pub cache_dir: String,
    /// Records found for the source
    pub file_count: usize,
    /// Records that parsed and validated
    pub valid_files: usize,
    /// Records that did not
    pub invalid_files: usize,
    /// Combined size of all records, in bytes
    pub total_size_bytes: u64,
    /// Average record size, in bytes
    pub avg_size_bytes: u64,
    /// Largest record size, in bytes
    pub max_size_bytes: u64,
    /// Name of the oldest record on disk
    pub oldest_file: Option<String>,
    /// Name of the newest record on disk
    pub newest_file: Option<String>,
    /// Age of the oldest record, in days
    pub cache_age_days: f64,
    /// Most frequent `text` query parameters, with occurrence counts
    pub popular_queries: Vec<(String, usize)>,
    /// Distinct `text` query parameters seen
    pub unique_queries: usize,
}

/// Persists provider responses to individual JSON files.
#[derive(Debug, Clone)]
pub struct FileCache {
    /// Directory where cache records are stored
    cache_dir: PathBuf,
}

impl FileCache {
    /// Creates a file cache in the XDG-compliant cache directory
    /// (`~/.cache/jobcache/` on Linux).
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no
    /// home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "jobcache")?;
        Some(Self {
            cache_dir: project_dirs.cache_dir().to_path_buf(),
        })
    }

    /// Creates a file cache rooted at a specific directory.
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// The directory this cache reads and writes.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Persists a response payload for `{source}_{fingerprint(params)}`.
    ///
    /// The payload must pass [`Listings::is_cacheable`] for the given
    /// request; invalid payloads are skipped with a debug log. Items whose
    /// `id` already appears in another cached record for the same source are
    /// stripped before writing (items without an `id` are kept, and `found`
    /// is left untouched). Returns the record's path, or `None` when nothing
    /// was written.
    pub fn save(&self, source: &str, params: &Params, payload: &Listings) -> Option<PathBuf> {
        if !payload.is_cacheable(params) {
            debug!(source, "payload failed the validity policy, skipping persistence");
            return None;
        }

        let path = self.record_path(source, params);
        let mut data = payload.clone();
        let known = self.known_ids(source, &path);
        if !known.is_empty() {
            let before = data.items.len();
            data.items.retain(|item| match item_id(item) {
                Some(id) => !known.contains(&id),
                None => true,
            });
            let removed = before - data.items.len();
            if removed > 0 {
                debug!(source, removed, "dropped items already cached for this source");
            }
        }

        let record = CacheRecord {
            timestamp: Utc::now().timestamp(),
            meta: RecordMeta {
                params: params.clone(),
            },
            data,
        };
        if let Err(err) = self.write_record(&path, &record) {
            warn!(source, path = %path.display(), %err, "failed to write cache record");
            return None;
        }
        debug!(source, path = %path.display(), "response persisted to file cache");
        Some(path)
    }

    /// Looks up the record for `{source}_{fingerprint(params)}`.
    ///
    /// Returns `None` when no record exists, when the file is implausibly
    /// small, or when its structure fails validation; in the truncated and
    /// corrupt cases the file is deleted before returning so the next lookup
    /// is a clean miss.
    pub fn load(&self, source: &str, params: &Params) -> Option<CacheRecord> {
        let path = self.record_path(source, params);
        let len = match fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(source, path = %path.display(), %err, "failed to stat cache record");
                return None;
            }
        };
        if len < MIN_RECORD_BYTES {
            warn!(source, len, "cache record is implausibly small, discarding");
            self.discard(&path);
            return None;
        }

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) => {
                warn!(source, path = %path.display(), %err, "failed to read cache record");
                return None;
            }
        };
        // Typed deserialization is the structural check: a record missing
        // timestamp/meta/data, or whose items is not a sequence, fails here.
        match serde_json::from_str::<CacheRecord>(&content) {
            Ok(record) => {
                debug!(source, "file cache hit");
                Some(record)
            }
            Err(err) => {
                warn!(source, path = %path.display(), %err, "corrupt cache record, discarding");
                self.discard(&path);
                None
            }
        }
    }

    /// Deletes all records for `source`, or every record when `source` is
    /// `None`. Returns how many files were removed.
    pub fn clear(&self, source: Option<&str>) -> usize {
        let prefix = source.map(|s| format!("{s}_"));
        let mut removed = 0;
        for path in self.record_files() {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(prefix) = &prefix {
                if !name.starts_with(prefix.as_str()) {
                    continue;
                }
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) => warn!(path = %path.display(), %err, "failed to delete cache record"),
            }
        }
        info!(source = source.unwrap_or("all"), removed, "cache records cleared");
        removed
    }

    /// Gathers diagnostics for one source's records: counts, sizes, age,
    /// and the most frequent search queries seen in request parameters.
    pub fn status(&self, source: &str) -> CacheStatus {
        let prefix = format!("{source}_");
        let mut status = CacheStatus {
            cache_dir: self.cache_dir.display().to_string(),
            ..CacheStatus::default()
        };
        let mut sizes: Vec<u64> = Vec::new();
        let mut oldest: Option<(String, SystemTime)> = None;
        let mut newest: Option<(String, SystemTime)> = None;
        let mut query_counts: HashMap<String, usize> = HashMap::new();

        for path in self.record_files() {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with(&prefix) {
                continue;
            }
            status.file_count += 1;

            if let Ok(meta) = fs::metadata(&path) {
                sizes.push(meta.len());
                if let Ok(modified) = meta.modified() {
                    if oldest.as_ref().map_or(true, |(_, t)| modified < *t) {
                        oldest = Some((name.to_string(), modified));
                    }
                    if newest.as_ref().map_or(true, |(_, t)| modified > *t) {
                        newest = Some((name.to_string(), modified));
                    }
                }
            }

            let record = fs::read_to_string(&path)
                .ok()
                .and_then(|content| serde_json::from_str::<CacheRecord>(&content).ok());
            match record {
                Some(record) => {
                    status.valid_files += 1;
                    if let Some(Value::String(text)) = record.meta.params.get("text") {
                        *query_counts.entry(text.clone()).or_insert(0) += 1;
                    }
                }
                None => status.invalid_files += 1,
            }
        }

        status.total_size_bytes = sizes.iter().sum();
        status.max_size_bytes = sizes.iter().copied().max().unwrap_or(0);
        if !sizes.is_empty() {
            status.avg_size_bytes = status.total_size_bytes / sizes.len() as u64;
        }
        if let Some((name, modified)) = &oldest {
            status.oldest_file = Some(name.clone());
            if let Ok(age) = SystemTime::now().duration_since(*modified) {
                status.cache_age_days = age.as_secs_f64() / 86_400.0;
            }
        }
        status.newest_file = newest.map(|(name, _)| name);
        status.unique_queries = query_counts.len();

        let mut popular: Vec<(String, usize)> = query_counts.into_iter().collect();
        popular.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        popular.truncate(TOP_QUERIES);
        status.popular_queries = popular;
        status
    }

    /// Returns the path of the record for the given source and parameters.
    fn record_path(&self, source: &str, params: &Params) -> PathBuf {
        self.cache_dir
            .join(format!("{}_{}.json", source, fingerprint(params)))
    }

    fn ensure_dir(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.cache_dir)
    }

    fn write_record(&self, path: &Path, record: &CacheRecord) -> std::io::Result<()> {
        self.ensure_dir()?;
        let json = serde_json::to_string_pretty(record)
            .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))?;
        fs::write(path, json)
    }

    /// Best-effort deletion of a bad record; failure only gets logged.
    fn discard(&self, path: &Path) {
        if let Err(err) = fs::remove_file(path) {
            warn!(path = %path.display(), %err, "failed to delete cache record");
        }
    }

    /// All JSON records currently in the cache directory.
    fn record_files(&self) -> Vec<PathBuf> {
        let entries = match fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };
        entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect()
    }

    /// Item ids already cached for `source`, excluding the record at
    /// `exclude` so that overwriting a request with itself is not treated as
    /// a duplicate of its own previous contents.
    fn known_ids(&self, source: &str, exclude: &Path) -> HashSet<String> {
        let prefix = format!("{source}_");
        let mut ids = HashSet::new();
        for path in self.record_files() {
            if path == exclude {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with(&prefix) {
                continue;
            }
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            let Ok(record) = serde_json::from_str::<CacheRecord>(&content) else {
                continue;
            };
            for item in &record.data.items {
                if let Some(id) = item_id(item) {
                    ids.insert(id);
                }
            }
        }
        ids
    }
}

/// Identity key of a listing item, when it has one.
fn item_id(item: &Value) -> Option<String> {
    match item.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

//! Data model shared by the store, working set and engine.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{Error, codec};

/// Server-supplied freshness tokens for a cached body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Validator {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl Validator {
    pub fn new(etag: Option<String>, last_modified: Option<String>) -> Self {
        Self { etag: etag.filter(|s| !s.is_empty()), last_modified: last_modified.filter(|s| !s.is_empty()) }
    }

    /// True when neither token is present.
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }

    /// Whether `other` proves the stored body is still current.
    ///
    /// A match on either token is enough. Missing tokens never match, so a
    /// resource without validators is replaced whenever it is re-observed.
    pub fn matches(&self, other: &Validator) -> bool {
        let etag_match = matches!((&self.etag, &other.etag), (Some(a), Some(b)) if a == b);
        let modified_match = matches!((&self.last_modified, &other.last_modified), (Some(a), Some(b)) if a == b);
        etag_match || modified_match
    }
}

/// A cached resource as persisted in the durable store.
///
/// `size_bytes` is the decoded body length; `body` holds the stored
/// (possibly compressed) bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResource {
    pub url: String,
    pub origin_host: String,
    pub body: Vec<u8>,
    pub content_type: String,
    pub size_bytes: u64,
    pub compressed: bool,
    pub validator: Validator,
    pub cached_at: i64,
    pub last_accessed_at: i64,
    pub last_validated_at: i64,
}

impl CachedResource {
    /// Metadata projection without the body.
    pub fn meta(&self) -> ResourceMeta {
        ResourceMeta {
            url: self.url.clone(),
            origin_host: self.origin_host.clone(),
            content_type: self.content_type.clone(),
            size_bytes: self.size_bytes,
            stored_bytes: self.body.len() as u64,
            compressed: self.compressed,
            validator: self.validator.clone(),
            cached_at: self.cached_at,
            last_accessed_at: self.last_accessed_at,
            last_validated_at: self.last_validated_at,
        }
    }

    /// Body bytes as originally fetched.
    pub fn decoded_body(&self) -> Result<Vec<u8>, Error> {
        if self.compressed { codec::decompress(&self.body) } else { Ok(self.body.clone()) }
    }
}

/// Lightweight resource metadata held in the working set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ResourceMeta {
    pub url: String,
    pub origin_host: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub stored_bytes: u64,
    pub compressed: bool,
    pub validator: Validator,
    pub cached_at: i64,
    pub last_accessed_at: i64,
    pub last_validated_at: i64,
}

/// Hit/miss/bytes counters, used both for durable totals and pending deltas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StatsTotals {
    pub hits: u64,
    pub misses: u64,
    pub bytes_saved: u64,
}

impl StatsTotals {
    pub fn is_zero(&self) -> bool {
        self.hits == 0 && self.misses == 0 && self.bytes_saved == 0
    }

    /// Add `other` into `self`, saturating.
    pub fn merge(&mut self, other: StatsTotals) {
        self.hits = self.hits.saturating_add(other.hits);
        self.misses = self.misses.saturating_add(other.misses);
        self.bytes_saved = self.bytes_saved.saturating_add(other.bytes_saved);
    }

    pub fn combined(mut self, other: StatsTotals) -> Self {
        self.merge(other);
        self
    }
}

/// Persisted eviction settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Settings {
    /// Resources not accessed within this many days are swept. `0` disables the sweep.
    pub max_age_days: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self { max_age_days: 30 }
    }
}

impl Settings {
    /// Access-time cutoff in epoch millis for a sweep at `now`, if sweeping is enabled.
    pub fn cutoff(&self, now: i64) -> Option<i64> {
        (self.max_age_days > 0).then(|| now - i64::from(self.max_age_days) * 86_400_000)
    }
}

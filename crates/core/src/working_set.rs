//! Bounded in-memory projection of cached metadata, partitioned by origin.
//!
//! Origins are loaded lazily from an [`AssetSource`] on first access and
//! evicted least-recently-used once more than the configured number are
//! resident. Eviction only drops memory; the durable store keeps the data
//! and a later visit reloads it.
//!
//! Concurrent first visits to the same origin share one scan through a
//! per-origin `OnceCell` load handle. The handle is dropped when the origin
//! is evicted, and a load that finishes after its handle was dropped does
//! not install its (now stale) result.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::model::ResourceMeta;
use crate::{CacheDb, Error};

/// Source of per-origin metadata scans.
#[async_trait]
pub trait AssetSource: Send + Sync {
    /// Fresh scan of every resource owned by `origin_host`.
    async fn scan_origin(&self, origin_host: &str) -> Result<Vec<ResourceMeta>, Error>;
}

#[async_trait]
impl AssetSource for CacheDb {
    async fn scan_origin(&self, origin_host: &str) -> Result<Vec<ResourceMeta>, Error> {
        self.list_meta_by_origin(origin_host).await
    }
}

/// Resident metadata for one origin.
#[derive(Debug, Clone, Default)]
pub struct OriginEntry {
    resources: HashMap<String, ResourceMeta>,
    total_size_bytes: u64,
}

impl OriginEntry {
    fn from_metas(metas: Vec<ResourceMeta>) -> Self {
        let mut entry = Self::default();
        for meta in metas {
            entry.insert(meta);
        }
        entry
    }

    fn insert(&mut self, meta: ResourceMeta) -> Option<ResourceMeta> {
        self.total_size_bytes += meta.size_bytes;
        let previous = self.resources.insert(meta.url.clone(), meta);
        if let Some(prev) = &previous {
            self.total_size_bytes -= prev.size_bytes;
        }
        previous
    }

    fn remove(&mut self, url: &str) -> Option<ResourceMeta> {
        let removed = self.resources.remove(url)?;
        self.total_size_bytes -= removed.size_bytes;
        Some(removed)
    }

    pub fn item_count(&self) -> usize {
        self.resources.len()
    }

    pub fn total_size_bytes(&self) -> u64 {
        self.total_size_bytes
    }
}

struct Inner {
    lru: LruCache<String, OriginEntry>,
    loads: HashMap<String, Arc<OnceCell<()>>>,
}

/// Origin-level LRU of resource metadata.
pub struct WorkingSet {
    source: Arc<dyn AssetSource>,
    inner: Mutex<Inner>,
}

impl WorkingSet {
    pub fn new(source: Arc<dyn AssetSource>, max_origins: usize) -> Self {
        let cap = NonZeroUsize::new(max_origins).unwrap_or(NonZeroUsize::MIN);
        Self { source, inner: Mutex::new(Inner { lru: LruCache::new(cap), loads: HashMap::new() }) }
    }

    /// Make `origin_host` resident, loading it from the source if needed.
    ///
    /// A resident origin is promoted to most-recently-used and no scan is
    /// issued. A failed scan leaves the origin unloaded so the next call
    /// retries.
    pub async fn ensure_loaded(&self, origin_host: &str) -> Result<(), Error> {
        let handle = {
            let mut inner = self.inner.lock();
            if inner.lru.get(origin_host).is_some() {
                return Ok(());
            }
            inner
                .loads
                .entry(origin_host.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        handle
            .get_or_try_init(|| async {
                let metas = self.source.scan_origin(origin_host).await?;
                self.install(origin_host, &handle, metas);
                Ok::<(), Error>(())
            })
            .await?;

        Ok(())
    }

    fn install(&self, origin_host: &str, handle: &Arc<OnceCell<()>>, metas: Vec<ResourceMeta>) {
        let mut inner = self.inner.lock();
        let current = inner.loads.get(origin_host).is_some_and(|h| Arc::ptr_eq(h, handle));
        if !current {
            tracing::debug!(origin = %origin_host, "discarding load for evicted origin");
            return;
        }

        let entry = OriginEntry::from_metas(metas);
        tracing::debug!(origin = %origin_host, items = entry.item_count(), "origin loaded");
        if let Some((evicted, _)) = inner.lru.push(origin_host.to_string(), entry)
            && evicted != origin_host
        {
            inner.loads.remove(&evicted);
            tracing::debug!(origin = %evicted, "evicted origin from working set");
        }
    }

    /// Metadata for `url` if its origin is resident. Promotes the origin.
    pub fn lookup(&self, origin_host: &str, url: &str) -> Option<ResourceMeta> {
        let mut inner = self.inner.lock();
        inner.lru.get(origin_host)?.resources.get(url).cloned()
    }

    /// Whether `url` is resident, without changing recency.
    pub fn contains(&self, origin_host: &str, url: &str) -> bool {
        let inner = self.inner.lock();
        inner
            .lru
            .peek(origin_host)
            .is_some_and(|entry| entry.resources.contains_key(url))
    }

    /// Insert or replace metadata in its origin's entry.
    ///
    /// Returns the replaced record, if any. Non-resident origins are left
    /// alone; their next load reads the durable store.
    pub fn upsert(&self, meta: ResourceMeta) -> Option<ResourceMeta> {
        let mut inner = self.inner.lock();
        match inner.lru.get_mut(&meta.origin_host) {
            Some(entry) => entry.insert(meta),
            None => {
                tracing::debug!(origin = %meta.origin_host, url = %meta.url, "upsert for non-resident origin skipped");
                None
            }
        }
    }

    /// Advance the access time of a resident resource. Returns whether it was found.
    pub fn touch(&self, origin_host: &str, url: &str, accessed_at: i64) -> bool {
        let mut inner = self.inner.lock();
        let Some(meta) = inner.lru.get_mut(origin_host).and_then(|e| e.resources.get_mut(url)) else {
            return false;
        };
        meta.last_accessed_at = meta.last_accessed_at.max(accessed_at);
        true
    }

    pub fn remove(&self, origin_host: &str, url: &str) -> Option<ResourceMeta> {
        let mut inner = self.inner.lock();
        inner.lru.peek_mut(origin_host)?.remove(url)
    }

    /// Drop an origin from memory along with its load handle.
    pub fn evict_origin(&self, origin_host: &str) -> bool {
        let mut inner = self.inner.lock();
        inner.loads.remove(origin_host);
        inner.lru.pop(origin_host).is_some()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.lru.clear();
        inner.loads.clear();
    }

    /// `(item_count, total_size_bytes)` for a resident origin.
    pub fn summary(&self, origin_host: &str) -> Option<(usize, u64)> {
        let inner = self.inner.lock();
        inner
            .lru
            .peek(origin_host)
            .map(|e| (e.item_count(), e.total_size_bytes()))
    }

    /// Resident origins, most recently used first.
    pub fn resident_origins(&self) -> Vec<String> {
        let inner = self.inner.lock();
        inner.lru.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().lru.cap().get()
    }
}

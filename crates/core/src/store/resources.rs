//! Resource CRUD operations.
//!
//! Point lookup by URL, scans by origin, upsert, and the delete variants
//! used by purges and the age sweep. Every scan is a fresh query; nothing
//! here holds a cursor between calls.

use super::connection::CacheDb;
use crate::model::{CachedResource, ResourceMeta, Validator};
use crate::Error;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

const META_COLUMNS: &str = "url, origin_host, content_type, size_bytes, stored_bytes, compressed,
     etag, last_modified, cached_at, last_accessed_at, last_validated_at";

/// Aggregate size of the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StoreTotals {
    pub item_count: u64,
    pub size_bytes: u64,
    pub stored_bytes: u64,
}

fn meta_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ResourceMeta> {
    Ok(ResourceMeta {
        url: row.get(0)?,
        origin_host: row.get(1)?,
        content_type: row.get(2)?,
        size_bytes: row.get::<_, i64>(3)? as u64,
        stored_bytes: row.get::<_, i64>(4)? as u64,
        compressed: row.get::<_, i32>(5)? == 1,
        validator: Validator { etag: row.get(6)?, last_modified: row.get(7)? },
        cached_at: row.get(8)?,
        last_accessed_at: row.get(9)?,
        last_validated_at: row.get(10)?,
    })
}

fn resource_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CachedResource> {
    let meta = meta_from_row(row)?;
    Ok(CachedResource {
        url: meta.url,
        origin_host: meta.origin_host,
        body: row.get(11)?,
        content_type: meta.content_type,
        size_bytes: meta.size_bytes,
        compressed: meta.compressed,
        validator: meta.validator,
        cached_at: meta.cached_at,
        last_accessed_at: meta.last_accessed_at,
        last_validated_at: meta.last_validated_at,
    })
}

impl CacheDb {
    /// Insert or replace a cached resource.
    ///
    /// Overwrites every column of an existing row with the same URL. There
    /// is no merge; callers that need a partial update read first.
    pub async fn put_resource(&self, resource: &CachedResource) -> Result<(), Error> {
        let r = resource.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO resources (
                    url, origin_host, content_type, size_bytes, stored_bytes, compressed,
                    etag, last_modified, cached_at, last_accessed_at, last_validated_at, body
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                ON CONFLICT(url) DO UPDATE SET
                    origin_host = excluded.origin_host,
                    content_type = excluded.content_type,
                    size_bytes = excluded.size_bytes,
                    stored_bytes = excluded.stored_bytes,
                    compressed = excluded.compressed,
                    etag = excluded.etag,
                    last_modified = excluded.last_modified,
                    cached_at = excluded.cached_at,
                    last_accessed_at = excluded.last_accessed_at,
                    last_validated_at = excluded.last_validated_at,
                    body = excluded.body",
                    params![
                        &r.url,
                        &r.origin_host,
                        &r.content_type,
                        r.size_bytes as i64,
                        r.body.len() as i64,
                        r.compressed as i32,
                        &r.validator.etag,
                        &r.validator.last_modified,
                        r.cached_at,
                        r.last_accessed_at,
                        r.last_validated_at,
                        &r.body,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get a resource by normalized URL.
    ///
    /// Returns None if the URL isn't cached.
    pub async fn get_resource(&self, url: &str) -> Result<Option<CachedResource>, Error> {
        let url = url.to_string();
        self.conn
            .call(move |conn| -> Result<Option<CachedResource>, Error> {
                let mut stmt = conn.prepare(&format!("SELECT {META_COLUMNS}, body FROM resources WHERE url = ?1"))?;

                match stmt.query_row(params![url], resource_from_row) {
                    Ok(r) => Ok(Some(r)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// All resources owned by an origin, bodies included.
    pub async fn list_by_origin(&self, origin_host: &str) -> Result<Vec<CachedResource>, Error> {
        let origin_host = origin_host.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<CachedResource>, Error> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {META_COLUMNS}, body FROM resources WHERE origin_host = ?1 ORDER BY url"
                ))?;
                let rows = stmt.query_map(params![origin_host], resource_from_row)?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
            .map_err(Error::from)
    }

    /// Metadata for every resource owned by an origin, without bodies.
    pub async fn list_meta_by_origin(&self, origin_host: &str) -> Result<Vec<ResourceMeta>, Error> {
        let origin_host = origin_host.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<ResourceMeta>, Error> {
                let mut stmt =
                    conn.prepare(&format!("SELECT {META_COLUMNS} FROM resources WHERE origin_host = ?1 ORDER BY url"))?;
                let rows = stmt.query_map(params![origin_host], meta_from_row)?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
            .map_err(Error::from)
    }

    /// Metadata for every cached resource.
    pub async fn list_all_meta(&self) -> Result<Vec<ResourceMeta>, Error> {
        self.conn
            .call(move |conn| -> Result<Vec<ResourceMeta>, Error> {
                let mut stmt = conn.prepare(&format!("SELECT {META_COLUMNS} FROM resources ORDER BY origin_host, url"))?;
                let rows = stmt.query_map([], meta_from_row)?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
            .map_err(Error::from)
    }

    /// Advance the access time of a resource without touching its body.
    ///
    /// Returns false if the URL isn't cached. Access time never moves backwards.
    pub async fn touch_resource(&self, url: &str, accessed_at: i64) -> Result<bool, Error> {
        let url = url.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let updated = conn.execute(
                    "UPDATE resources SET last_accessed_at = MAX(last_accessed_at, ?2) WHERE url = ?1",
                    params![url, accessed_at],
                )?;
                Ok(updated > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete one resource. Returns whether a row was removed.
    pub async fn delete_resource(&self, url: &str) -> Result<bool, Error> {
        let url = url.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM resources WHERE url = ?1", params![url])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every resource owned by an origin.
    ///
    /// Returns the URLs that were removed.
    pub async fn delete_by_origin(&self, origin_host: &str) -> Result<Vec<String>, Error> {
        let origin_host = origin_host.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let tx = conn.transaction()?;
                let urls = {
                    let mut stmt = tx.prepare("SELECT url FROM resources WHERE origin_host = ?1")?;
                    let rows = stmt.query_map(params![origin_host], |row| row.get(0))?;
                    rows.collect::<Result<Vec<String>, _>>()?
                };
                tx.execute("DELETE FROM resources WHERE origin_host = ?1", params![origin_host])?;
                tx.commit()?;
                Ok(urls)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every resource.
    ///
    /// Returns the number of deleted entries.
    pub async fn delete_all_resources(&self) -> Result<u64, Error> {
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM resources", [])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete resources last accessed before `cutoff` (epoch millis).
    ///
    /// Returns the `(url, origin_host)` pairs that were removed.
    pub async fn delete_older_than(&self, cutoff: i64) -> Result<Vec<(String, String)>, Error> {
        self.conn
            .call(move |conn| -> Result<Vec<(String, String)>, Error> {
                let tx = conn.transaction()?;
                let removed = {
                    let mut stmt = tx.prepare("SELECT url, origin_host FROM resources WHERE last_accessed_at < ?1")?;
                    let rows = stmt.query_map(params![cutoff], |row| Ok((row.get(0)?, row.get(1)?)))?;
                    rows.collect::<Result<Vec<(String, String)>, _>>()?
                };
                tx.execute("DELETE FROM resources WHERE last_accessed_at < ?1", params![cutoff])?;
                tx.commit()?;
                Ok(removed)
            })
            .await
            .map_err(Error::from)
    }

    /// Item count and byte sums for one origin, straight from the store.
    pub async fn origin_totals(&self, origin_host: &str) -> Result<StoreTotals, Error> {
        let origin_host = origin_host.to_string();
        self.conn
            .call(move |conn| -> Result<StoreTotals, Error> {
                let totals = conn.query_row(
                    "SELECT COUNT(*), COALESCE(SUM(size_bytes), 0), COALESCE(SUM(stored_bytes), 0)
                     FROM resources WHERE origin_host = ?1",
                    params![origin_host],
                    |row| {
                        Ok(StoreTotals {
                            item_count: row.get::<_, i64>(0)? as u64,
                            size_bytes: row.get::<_, i64>(1)? as u64,
                            stored_bytes: row.get::<_, i64>(2)? as u64,
                        })
                    },
                )?;
                Ok(totals)
            })
            .await
            .map_err(Error::from)
    }

    /// Item count and byte sums across the whole store.
    pub async fn totals(&self) -> Result<StoreTotals, Error> {
        self.conn
            .call(move |conn| -> Result<StoreTotals, Error> {
                let totals = conn.query_row(
                    "SELECT COUNT(*), COALESCE(SUM(size_bytes), 0), COALESCE(SUM(stored_bytes), 0) FROM resources",
                    [],
                    |row| {
                        Ok(StoreTotals {
                            item_count: row.get::<_, i64>(0)? as u64,
                            size_bytes: row.get::<_, i64>(1)? as u64,
                            stored_bytes: row.get::<_, i64>(2)? as u64,
                        })
                    },
                )?;
                Ok(totals)
            })
            .await
            .map_err(Error::from)
    }
}

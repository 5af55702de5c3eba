//! Serve-rule identifier allocator.
//!
//! Identifiers are allocated once per URL from an AUTOINCREMENT table and
//! never handed out again, even after the resource is purged.

use super::connection::CacheDb;
use crate::Error;
use tokio_rusqlite::params;

impl CacheDb {
    /// Identifier for the serve rule of `url`, allocating one on first use.
    pub async fn allocate_rule_id(&self, url: &str) -> Result<i64, Error> {
        let url = url.to_string();
        self.conn
            .call(move |conn| -> Result<i64, Error> {
                conn.execute("INSERT OR IGNORE INTO rule_ids (url) VALUES (?1)", params![url])?;
                let id = conn.query_row("SELECT id FROM rule_ids WHERE url = ?1", params![url], |row| row.get(0))?;
                Ok(id)
            })
            .await
            .map_err(Error::from)
    }
}

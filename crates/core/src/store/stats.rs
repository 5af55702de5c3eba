//! Cumulative counter persistence.

use super::connection::CacheDb;
use crate::Error;
use crate::model::StatsTotals;
use tokio_rusqlite::params;

impl CacheDb {
    /// Load the durable cumulative counters.
    pub async fn load_stats(&self) -> Result<StatsTotals, Error> {
        self.conn
            .call(move |conn| -> Result<StatsTotals, Error> {
                let totals = conn.query_row("SELECT hits, misses, bytes_saved FROM stats WHERE id = 1", [], |row| {
                    Ok(StatsTotals {
                        hits: row.get::<_, i64>(0)? as u64,
                        misses: row.get::<_, i64>(1)? as u64,
                        bytes_saved: row.get::<_, i64>(2)? as u64,
                    })
                })?;
                Ok(totals)
            })
            .await
            .map_err(Error::from)
    }

    /// Add a delta to the durable counters in one statement.
    pub async fn add_stats(&self, delta: StatsTotals) -> Result<StatsTotals, Error> {
        self.conn
            .call(move |conn| -> Result<StatsTotals, Error> {
                conn.execute(
                    "UPDATE stats SET
                        hits = hits + ?1,
                        misses = misses + ?2,
                        bytes_saved = bytes_saved + ?3
                     WHERE id = 1",
                    params![delta.hits as i64, delta.misses as i64, delta.bytes_saved as i64],
                )?;
                let totals = conn.query_row("SELECT hits, misses, bytes_saved FROM stats WHERE id = 1", [], |row| {
                    Ok(StatsTotals {
                        hits: row.get::<_, i64>(0)? as u64,
                        misses: row.get::<_, i64>(1)? as u64,
                        bytes_saved: row.get::<_, i64>(2)? as u64,
                    })
                })?;
                Ok(totals)
            })
            .await
            .map_err(Error::from)
    }

    /// Zero the durable counters.
    pub async fn reset_stats(&self) -> Result<(), Error> {
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute("UPDATE stats SET hits = 0, misses = 0, bytes_saved = 0 WHERE id = 1", [])?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}

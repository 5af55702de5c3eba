//! Site preference and settings persistence.

use super::connection::CacheDb;
use crate::Error;
use crate::model::Settings;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

const SETTINGS_KEY: &str = "settings";

impl CacheDb {
    /// Stored caching preference for an origin, if one was ever set.
    pub async fn get_site_pref(&self, origin_host: &str) -> Result<Option<bool>, Error> {
        let origin_host = origin_host.to_string();
        self.conn
            .call(move |conn| -> Result<Option<bool>, Error> {
                let result = conn.query_row(
                    "SELECT caching_enabled FROM site_prefs WHERE origin_host = ?1",
                    params![origin_host],
                    |row| row.get::<_, i32>(0),
                );
                match result {
                    Ok(v) => Ok(Some(v == 1)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Create or update the caching preference for an origin.
    pub async fn set_site_pref(&self, origin_host: &str, enabled: bool) -> Result<(), Error> {
        let origin_host = origin_host.to_string();
        let now = crate::now_millis();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO site_prefs (origin_host, caching_enabled, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(origin_host) DO UPDATE SET
                        caching_enabled = excluded.caching_enabled,
                        updated_at = excluded.updated_at",
                    params![origin_host, enabled as i32, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Every stored preference as `(origin_host, enabled)`.
    pub async fn list_site_prefs(&self) -> Result<Vec<(String, bool)>, Error> {
        self.conn
            .call(move |conn| -> Result<Vec<(String, bool)>, Error> {
                let mut stmt = conn.prepare("SELECT origin_host, caching_enabled FROM site_prefs ORDER BY origin_host")?;
                let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get::<_, i32>(1)? == 1)))?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
            .map_err(Error::from)
    }

    /// Stored settings, or None when nothing was saved yet.
    pub async fn load_settings(&self) -> Result<Option<Settings>, Error> {
        self.conn
            .call(move |conn| -> Result<Option<Settings>, Error> {
                let result = conn.query_row(
                    "SELECT value_json FROM settings WHERE key = ?1",
                    params![SETTINGS_KEY],
                    |row| row.get::<_, String>(0),
                );
                match result {
                    Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Persist settings, replacing any previous blob.
    pub async fn save_settings(&self, settings: Settings) -> Result<(), Error> {
        let json = serde_json::to_string(&settings)?;
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO settings (key, value_json) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
                    params![SETTINGS_KEY, json],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}

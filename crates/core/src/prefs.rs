//! Per-origin caching preferences.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::{CacheDb, Error};

/// In-memory view of the `site_prefs` table. Origins without a stored
/// preference have caching enabled.
#[derive(Debug)]
pub struct SitePrefs {
    db: CacheDb,
    cache: RwLock<HashMap<String, bool>>,
}

impl SitePrefs {
    /// Load every stored preference.
    pub async fn load(db: CacheDb) -> Result<Self, Error> {
        let stored = db.list_site_prefs().await?;
        Ok(Self { db, cache: RwLock::new(stored.into_iter().collect()) })
    }

    pub fn is_enabled(&self, origin_host: &str) -> bool {
        self.cache.read().get(origin_host).copied().unwrap_or(true)
    }

    /// Persist a preference, then reflect it in memory.
    ///
    /// Returns the previous effective value.
    pub async fn set(&self, origin_host: &str, enabled: bool) -> Result<bool, Error> {
        self.db.set_site_pref(origin_host, enabled).await?;
        let previous = self.cache.write().insert(origin_host.to_string(), enabled);
        Ok(previous.unwrap_or(true))
    }
}

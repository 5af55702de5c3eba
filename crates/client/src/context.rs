//! Shared engine state.
//!
//! One [`CacheContext`] owns the store handle, working set, stats ledger,
//! preferences and settings. The pipeline and controller both receive it
//! as an `Arc` rather than reaching for globals.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use cachet_core::config::AppConfig;
use cachet_core::{CacheDb, Error, Settings, SitePrefs, StatsLedger, WorkingSet};

/// Purge generations: a global one bumped by full purges and one per origin.
#[derive(Debug, Default)]
pub struct PurgeLog {
    all: u64,
    origins: HashMap<String, u64>,
}

/// Snapshot of the purge generations that apply to one origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeMark {
    all: u64,
    origin: u64,
}

impl PurgeLog {
    pub fn mark(&self, origin_host: &str) -> PurgeMark {
        PurgeMark { all: self.all, origin: self.origins.get(origin_host).copied().unwrap_or_default() }
    }

    pub fn bump_origin(&mut self, origin_host: &str) {
        *self.origins.entry(origin_host.to_string()).or_default() += 1;
    }

    pub fn bump_all(&mut self) {
        self.all += 1;
    }
}

pub struct CacheContext {
    pub db: CacheDb,
    pub working_set: WorkingSet,
    pub stats: StatsLedger,
    pub prefs: SitePrefs,
    pub config: AppConfig,
    /// Commits hold a read guard across their durable write; purges take the
    /// write guard, so a purge never interleaves with a half-done commit.
    pub purges: tokio::sync::RwLock<PurgeLog>,
    settings: RwLock<Settings>,
}

impl CacheContext {
    /// Build the context over an open store, loading persisted counters,
    /// preferences and settings.
    pub async fn open(db: CacheDb, config: AppConfig) -> Result<Arc<Self>, Error> {
        let durable = db.load_stats().await?;
        let prefs = SitePrefs::load(db.clone()).await?;
        let settings = db.load_settings().await?.unwrap_or_else(|| config.default_settings());
        let working_set = WorkingSet::new(Arc::new(db.clone()), config.max_resident_origins);

        tracing::info!(
            hits = durable.hits,
            misses = durable.misses,
            bytes_saved = durable.bytes_saved,
            max_age_days = settings.max_age_days,
            "cache context opened"
        );

        Ok(Arc::new(Self {
            db,
            working_set,
            stats: StatsLedger::with_durable(durable),
            prefs,
            config,
            purges: tokio::sync::RwLock::new(PurgeLog::default()),
            settings: RwLock::new(settings),
        }))
    }

    pub fn settings(&self) -> Settings {
        *self.settings.read()
    }

    /// Persist new settings and make them current.
    pub async fn update_settings(&self, settings: Settings) -> Result<Settings, Error> {
        self.db.save_settings(settings).await?;
        *self.settings.write() = settings;
        Ok(settings)
    }
}

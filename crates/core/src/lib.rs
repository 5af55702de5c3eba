//! Core types and shared state for cachet.
//!
//! This crate provides:
//! - Durable asset store with SQLite backend
//! - Working-set cache of per-origin resource metadata
//! - Session statistics ledger with batched flushes
//! - Unified error types
//! - Configuration structures

pub mod codec;
pub mod config;
pub mod error;
pub mod model;
pub mod prefs;
pub mod stats;
pub mod store;
pub mod working_set;

pub use error::Error;
pub use model::{CachedResource, ResourceMeta, Settings, StatsTotals, Validator};
pub use prefs::SitePrefs;
pub use stats::{OriginCounters, StatsLedger};
pub use store::CacheDb;
pub use working_set::{AssetSource, WorkingSet};

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

//! SQLite-backed durable asset store.
//!
//! Persists cached resource bodies keyed by normalized URL, together with
//! the small tables the engine needs to survive restarts:
//!
//! - Resource table with a secondary index by owning origin
//! - Cumulative hit/miss/bytes counters
//! - Per-origin caching preferences and settings blobs
//! - Serve-rule identifier allocator
//!
//! Access goes through tokio-rusqlite, which runs every statement on a
//! dedicated background thread.

pub mod connection;
pub mod migrations;
pub mod prefs;
pub mod resources;
pub mod rules;
pub mod stats;

pub use crate::Error;

pub use connection::CacheDb;
pub use resources::StoreTotals;
